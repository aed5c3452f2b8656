//! Actor message and response payloads.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

/// Shared opaque object carried in the third parameter slot.
pub type Object = Arc<dyn Any + Send + Sync>;

/// The three-slot payload carried by messages and responses.
#[derive(Clone, Default)]
pub struct MessageParams {
    /// Unsigned integer slot.
    pub param1: u64,
    /// Signed integer slot.
    pub param2: i64,
    /// Optional shared object.
    pub param3: Option<Object>,
}

impl MessageParams {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `param1`.
    pub fn with_param1(mut self, value: u64) -> Self {
        self.param1 = value;
        self
    }

    /// Set `param2`.
    pub fn with_param2(mut self, value: i64) -> Self {
        self.param2 = value;
        self
    }

    /// Set `param3` to a shared object.
    pub fn with_object<T: Any + Send + Sync>(mut self, object: T) -> Self {
        self.param3 = Some(Arc::new(object));
        self
    }

    /// Set `param3` to an existing shared object.
    pub fn with_param3(mut self, object: Object) -> Self {
        self.param3 = Some(object);
        self
    }

    /// Downcast `param3`.
    pub fn object<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.param3.as_deref()?.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for MessageParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageParams")
            .field("param1", &self.param1)
            .field("param2", &self.param2)
            .field("param3", &self.param3.is_some())
            .finish()
    }
}

/// A unit of work for a [`MessageActor`](super::MessageActor).
///
/// `kind` selects the handler. A nonzero response id means a sender is
/// blocked in [`ActorHandle::send`](super::ActorHandle::send) waiting for
/// the handler to reply.
pub struct Message {
    kind: u32,
    params: MessageParams,
    pub(super) response_id: u64,
    pub(super) due: Instant,
}

impl Message {
    /// Create a message of the given kind with an empty payload.
    pub fn new(kind: u32) -> Self {
        Self {
            kind,
            params: MessageParams::default(),
            response_id: 0,
            due: Instant::now(),
        }
    }

    /// Create a message with a full payload.
    pub fn with_params(kind: u32, params: MessageParams) -> Self {
        Self {
            params,
            ..Self::new(kind)
        }
    }

    /// Set `param1`.
    pub fn with_param1(mut self, value: u64) -> Self {
        self.params.param1 = value;
        self
    }

    /// Set `param2`.
    pub fn with_param2(mut self, value: i64) -> Self {
        self.params.param2 = value;
        self
    }

    /// Set `param3` to a shared object.
    pub fn with_object<T: Any + Send + Sync>(mut self, object: T) -> Self {
        self.params.param3 = Some(Arc::new(object));
        self
    }

    /// Handler selector.
    #[inline]
    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Unsigned integer slot.
    #[inline]
    pub fn param1(&self) -> u64 {
        self.params.param1
    }

    /// Signed integer slot.
    #[inline]
    pub fn param2(&self) -> i64 {
        self.params.param2
    }

    /// Shared object slot.
    pub fn param3(&self) -> Option<&Object> {
        self.params.param3.as_ref()
    }

    /// Downcast `param3`.
    pub fn object<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.params.object()
    }

    /// The whole payload.
    pub fn params(&self) -> &MessageParams {
        &self.params
    }

    /// Take the payload out of the message.
    pub fn into_params(self) -> MessageParams {
        self.params
    }

    /// Correlation id of a blocked sender, or 0.
    #[inline]
    pub fn response_id(&self) -> u64 {
        self.response_id
    }

    /// Whether a sender is waiting for a reply.
    #[inline]
    pub fn expects_response(&self) -> bool {
        self.response_id != 0
    }

    /// Earliest instant the message may be dispatched.
    #[inline]
    pub fn due_time(&self) -> Instant {
        self.due
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("response_id", &self.response_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = Message::new(7)
            .with_param1(42)
            .with_param2(-5)
            .with_object(String::from("hello"));

        assert_eq!(msg.kind(), 7);
        assert_eq!(msg.param1(), 42);
        assert_eq!(msg.param2(), -5);
        assert_eq!(msg.object::<String>().map(String::as_str), Some("hello"));
        assert!(msg.object::<u32>().is_none());
        assert!(!msg.expects_response());
    }

    #[test]
    fn test_params_object_shared() {
        let params = MessageParams::new().with_object(vec![1u8, 2, 3]);
        let copy = params.clone();
        assert_eq!(copy.object::<Vec<u8>>().map(Vec::len), Some(3));
        assert!(Arc::ptr_eq(
            params.param3.as_ref().unwrap(),
            copy.param3.as_ref().unwrap()
        ));
    }
}
