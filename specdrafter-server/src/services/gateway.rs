//! Generation gateway
//!
//! Shapes an instruction, an optional acknowledgement primer and conversation
//! turns into one provider call and hands back the fragment stream.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;

use crate::provider::{
    Content, FragmentStream, GenerateRequest, GenerationProvider, ProviderResult,
};

/// Which fragments the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Reasoning fragments are requested and tagged separately from text
    Thinking,
    /// Visible text only
    Plain,
}

/// Fixed instruction establishing the assistant's task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub text: String,
    /// Canned model reply; when set, instruction and reply are sent as the
    /// first user/model turn pair instead of a system instruction
    pub acknowledgement: Option<String>,
}

impl Instruction {
    pub fn primed(text: impl Into<String>, acknowledgement: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            acknowledgement: Some(acknowledgement.into()),
        }
    }
}

/// Stream of visible text chunks
pub type TextStream = BoxStream<'static, ProviderResult<String>>;

#[derive(Clone)]
pub struct Gateway {
    provider: Arc<dyn GenerationProvider>,
    model: String,
}

impl Gateway {
    pub fn new(provider: Arc<dyn GenerationProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn build_request(
        &self,
        instruction: &Instruction,
        turns: Vec<Content>,
        mode: GenerationMode,
    ) -> GenerateRequest {
        let mut contents = Vec::with_capacity(turns.len() + 2);
        let mut system_instruction = None;

        match &instruction.acknowledgement {
            Some(ack) => {
                contents.push(Content::user_text(instruction.text.clone()));
                contents.push(Content::model_text(ack.clone()));
            }
            None => system_instruction = Some(instruction.text.clone()),
        }
        contents.extend(turns);

        let mut request = GenerateRequest::new(self.model.clone(), contents);
        request.system_instruction = system_instruction;
        request.options.include_thoughts = mode == GenerationMode::Thinking;
        request
    }

    /// One streamed provider call; fragments keep arrival order
    pub async fn generate(
        &self,
        instruction: &Instruction,
        turns: Vec<Content>,
        mode: GenerationMode,
    ) -> ProviderResult<FragmentStream> {
        let request = self.build_request(instruction, turns, mode);
        self.provider.stream_generate(request).await
    }

    /// Plain-mode call reduced to visible text chunks
    pub async fn generate_text(
        &self,
        instruction: &Instruction,
        turns: Vec<Content>,
    ) -> ProviderResult<TextStream> {
        let fragments = self.generate(instruction, turns, GenerationMode::Plain).await?;

        let text = fragments.filter_map(|item| async move {
            match item {
                Ok(fragment) if fragment.thought => None,
                Ok(fragment) => Some(Ok(fragment.text)),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(text))
    }
}
