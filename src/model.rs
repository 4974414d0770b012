//! The single contract every provider adapter implements (SPEC_FULL §4.6).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::cancel::CancelHandle;
use crate::error::Result;
use crate::streaming::StreamPart;
use crate::types::{Call, Response};

pub type PartStream = BoxStream<'static, Result<StreamPart>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    async fn generate(&self, call: Call) -> Result<Response>;

    async fn stream(&self, call: Call, cancel: CancelHandle) -> Result<PartStream>;
}
