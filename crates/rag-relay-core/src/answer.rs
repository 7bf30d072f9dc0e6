//! Grounded answer composition.
//!
//! 1. Retrieve passages for the query.
//! 2. No passages: return [`FALLBACK_RESPONSE`] without calling the model.
//! 3. Otherwise format the passages, wrap them in the instruction template
//!    ([`build_prompt`]) and call the model once.
//! 4. Generation failures become an answer carrying the error text; this
//!    boundary never returns `Err`.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::format::format_contexts;
use crate::models::{GeneratedAnswer, RetrievalResult};
use crate::remote::{GenerationBackend, GenerationParams};
use crate::retrieval::Retriever;

/// Returned when retrieval finds nothing to ground an answer on.
pub const FALLBACK_RESPONSE: &str =
    "I don't have enough information to answer that question based on the available documents.";

const CITATION_INSTRUCTION: &str =
    "\n\nWhen providing information from the context, cite the source documents.";

/// Builds the generation prompt around a formatted context block.
pub fn build_prompt(query: &str, formatted_contexts: &str, include_citations: bool) -> String {
    let citation = if include_citations {
        CITATION_INSTRUCTION
    } else {
        ""
    };

    format!(
        "You are a helpful AI assistant that answers questions based on the provided context.\n\
         \n\
         Context from documents:\n\
         {formatted_contexts}\n\
         \n\
         Instructions:\n\
         - Answer the user's question based ONLY on the information provided in the context above\n\
         - If the context doesn't contain relevant information to answer the question, say so\n\
         - Be concise but comprehensive\n\
         - Use a professional and helpful tone{citation}\n\
         \n\
         User Question: {query}\n\
         \n\
         Answer:"
    )
}

/// Retrieval + generation for one query.
pub struct AnswerComposer {
    retriever: Retriever,
    generator: Arc<dyn GenerationBackend>,
    params: GenerationParams,
}

impl AnswerComposer {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn GenerationBackend>,
        params: GenerationParams,
    ) -> Self {
        Self {
            retriever,
            generator,
            params,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub async fn answer(
        &self,
        query: &str,
        filter: Option<&[String]>,
        include_citations: bool,
    ) -> GeneratedAnswer {
        let contexts = self.retriever.retrieve(query, filter, None).await;

        if contexts.is_empty() {
            warn!("no contexts retrieved; returning fallback answer");
            return self.fallback();
        }

        let prompt = build_prompt(query, &format_contexts(&contexts), include_citations);
        info!(
            model = self.model_name(),
            contexts = contexts.len(),
            "generating answer"
        );

        match self.generator.generate(&prompt, &self.params).await {
            Ok(text) => {
                let num_contexts_used = contexts.len();
                GeneratedAnswer {
                    response: text.trim().to_string(),
                    contexts,
                    model: self.model_name().to_string(),
                    num_contexts_used,
                    error: None,
                }
            }
            Err(err) => {
                error!(error = %err, "generation failed");
                let message = err.to_string();
                let num_contexts_used = contexts.len();
                GeneratedAnswer {
                    response: format!("Error generating response: {}", message),
                    contexts,
                    model: self.model_name().to_string(),
                    num_contexts_used,
                    error: Some(message),
                }
            }
        }
    }

    fn fallback(&self) -> GeneratedAnswer {
        GeneratedAnswer {
            response: FALLBACK_RESPONSE.to_string(),
            contexts: RetrievalResult::empty(),
            model: self.model_name().to_string(),
            num_contexts_used: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StaticGenerator;
    use crate::models::Collection;
    use crate::remote::{RawContext, RemoteError, RetrievalBackend, RetrievalRequest};
    use async_trait::async_trait;

    struct FixedRetrieval(Result<Vec<RawContext>, RemoteError>);

    #[async_trait]
    impl RetrievalBackend for FixedRetrieval {
        async fn retrieve_contexts(
            &self,
            _request: &RetrievalRequest,
        ) -> Result<Vec<RawContext>, RemoteError> {
            self.0.clone()
        }
    }

    fn composer(
        retrieval: Result<Vec<RawContext>, RemoteError>,
        generator: Arc<StaticGenerator>,
    ) -> AnswerComposer {
        let collections = vec![Collection {
            name: "legal".to_string(),
            prefix: "legal/".to_string(),
            corpus: "corpora/legal".to_string(),
            description: String::new(),
        }];
        let retriever = Retriever::new(Arc::new(FixedRetrieval(retrieval)), collections, 5);
        AnswerComposer::new(retriever, generator, GenerationParams::default())
    }

    fn two_passages() -> Vec<RawContext> {
        vec![
            RawContext {
                text: "Either party may terminate this agreement with 30 days written notice."
                    .to_string(),
                source_uri: Some("gs://docs/legal/msa.pdf".to_string()),
                distance: Some(0.21),
            },
            RawContext {
                text: "Termination for material breach takes effect immediately.".to_string(),
                source_uri: Some("gs://docs/legal/amendment.pdf".to_string()),
                distance: Some(0.34),
            },
        ]
    }

    #[test]
    fn test_prompt_with_citations() {
        let prompt = build_prompt("What is X?", "CTX", true);
        assert!(prompt.starts_with("You are a helpful AI assistant"));
        assert!(prompt.contains("Context from documents:\nCTX\n"));
        assert!(prompt.contains("- Use a professional and helpful tone\n\nWhen providing information from the context, cite the source documents.\n"));
        assert!(prompt.ends_with("User Question: What is X?\n\nAnswer:"));
    }

    #[test]
    fn test_prompt_without_citations() {
        let prompt = build_prompt("What is X?", "CTX", false);
        assert!(!prompt.contains("cite the source documents"));
        assert!(prompt.contains("- Use a professional and helpful tone\n\nUser Question: What is X?"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_never_calls_model() {
        let generator = Arc::new(StaticGenerator::new("gemini-test", "unused"));
        let composer = composer(Ok(vec![]), generator.clone());

        let answer = composer.answer("anything", None, true).await;
        assert_eq!(answer.response, FALLBACK_RESPONSE);
        assert_eq!(answer.num_contexts_used, 0);
        assert!(answer.contexts.is_empty());
        assert_eq!(answer.model, "gemini-test");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_retrieval_failure_falls_back() {
        let generator = Arc::new(StaticGenerator::new("gemini-test", "unused"));
        let composer = composer(
            Err(RemoteError::Transport("connection reset".to_string())),
            generator.clone(),
        );

        let answer = composer.answer("anything", None, true).await;
        assert_eq!(answer.response, FALLBACK_RESPONSE);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_two_passages_end_to_end() {
        let generator = Arc::new(StaticGenerator::new(
            "gemini-test",
            "  Either party may terminate with 30 days notice [msa.pdf].\n",
        ));
        let composer = composer(Ok(two_passages()), generator.clone());

        let answer = composer
            .answer("What is the termination clause?", None, true)
            .await;

        assert_eq!(answer.num_contexts_used, 2);
        assert_eq!(answer.contexts.len(), 2);
        assert_eq!(answer.contexts.contexts()[0].rank, 1);
        assert_eq!(answer.contexts.contexts()[0].source, "gs://docs/legal/msa.pdf");
        assert_eq!(answer.contexts.contexts()[1].rank, 2);
        assert_eq!(
            answer.contexts.contexts()[1].source,
            "gs://docs/legal/amendment.pdf"
        );
        assert_eq!(
            answer.response,
            "Either party may terminate with 30 days notice [msa.pdf]."
        );
        assert!(answer.error.is_none());
        assert_eq!(generator.calls(), 1);

        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("[Source: gs://docs/legal/msa.pdf]"));
        assert!(prompt.contains("User Question: What is the termination clause?"));
        let first = prompt.find("msa.pdf").unwrap();
        let second = prompt.find("amendment.pdf").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_generation_error_becomes_answer() {
        let generator = Arc::new(StaticGenerator::failing(
            "gemini-test",
            RemoteError::Status {
                status: 429,
                message: "quota exceeded".to_string(),
            },
        ));
        let composer = composer(Ok(two_passages()), generator.clone());

        let answer = composer.answer("q", None, false).await;
        assert_eq!(
            answer.error.as_deref(),
            Some("remote service error 429: quota exceeded")
        );
        assert_eq!(
            answer.response,
            "Error generating response: remote service error 429: quota exceeded"
        );
        assert_eq!(answer.num_contexts_used, 2);
        assert_eq!(generator.calls(), 1);
    }
}
