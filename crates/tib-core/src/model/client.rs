use async_trait::async_trait;

use super::types::*;

/// Completion backend used by the dispatch layer.
///
/// Implementations never fail: transport and upstream problems come back as
/// [`CompletionReply::Failed`] so every caller still gets a reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    async fn complete(&self, req: CompletionRequest) -> CompletionReply;

    async fn complete_text(&self, prompt: &str) -> CompletionReply {
        self.complete(CompletionRequest {
            model: self.model().to_string(),
            prompt: prompt.to_string(),
            image: None,
        })
        .await
    }

    async fn complete_with_image(&self, prompt: &str, image: Vec<u8>) -> CompletionReply {
        self.complete(CompletionRequest {
            model: self.model().to_string(),
            prompt: prompt.to_string(),
            image: Some(ImagePayload { bytes: image }),
        })
        .await
    }
}
