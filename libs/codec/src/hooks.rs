//! Custom serializer / parser hooks for vendor extensions
//!
//! Hooks apply to the JSON format only. A parser hook runs after the
//! payload was decoded and validated; its output is validated again and
//! must keep the request id, so a hook cannot smuggle an invalid message
//! past the codec.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Rewrites a parsed message using the raw JSON it came from
pub type ParserHook<T> = Arc<dyn Fn(&Value, T) -> T + Send + Sync>;

/// Rewrites the JSON produced for a message
pub type SerializerHook<T> = Arc<dyn Fn(&T, Value) -> Value + Send + Sync>;

/// Optional per-type codec hooks
pub struct CodecHooks<T> {
    parser: Option<ParserHook<T>>,
    serializer: Option<SerializerHook<T>>,
}

impl<T> CodecHooks<T> {
    pub fn none() -> Self {
        Self {
            parser: None,
            serializer: None,
        }
    }

    pub fn with_parser(mut self, hook: impl Fn(&Value, T) -> T + Send + Sync + 'static) -> Self {
        self.parser = Some(Arc::new(hook));
        self
    }

    pub fn with_serializer(
        mut self,
        hook: impl Fn(&T, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.serializer = Some(Arc::new(hook));
        self
    }

    pub fn has_parser(&self) -> bool {
        self.parser.is_some()
    }

    pub(crate) fn parse(&self, raw: &Value, message: T) -> T {
        match &self.parser {
            Some(hook) => hook(raw, message),
            None => message,
        }
    }

    pub(crate) fn serialize(&self, message: &T, json: Value) -> Value {
        match &self.serializer {
            Some(hook) => hook(message, json),
            None => json,
        }
    }
}

impl<T> Default for CodecHooks<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> Clone for CodecHooks<T> {
    fn clone(&self) -> Self {
        Self {
            parser: self.parser.clone(),
            serializer: self.serializer.clone(),
        }
    }
}

impl<T> fmt::Debug for CodecHooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecHooks")
            .field("parser", &self.parser.is_some())
            .field("serializer", &self.serializer.is_some())
            .finish()
    }
}
