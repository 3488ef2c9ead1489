//! Shared-payload handle for `VideoFrame`/`AudioData` (the MediaResource model).
//!
//! A `MediaHandle<P>` pairs a reference-counted, immutable payload with a closed
//! flag that belongs to *this handle alone*. Cloning shares the `Arc<P>` but hands
//! back a fresh, independently-owned flag, so closing one clone never closes
//! another — the property an `Arc<Mutex<Option<Inner>>>` design gets wrong by
//! sharing the flag itself across every clone.

use std::sync::Arc;

/// `(shared_payload_ref, owned_closed_flag)`, per the MediaResource design note.
/// `payload` is `None` exactly when this handle is closed; clearing it (rather than
/// flipping a shared flag) drops only this handle's strong reference, so the
/// payload's destructor only runs once every sharing handle has closed or dropped.
pub struct MediaHandle<P> {
    payload: Option<Arc<P>>,
}

impl<P> MediaHandle<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
        }
    }

    pub fn from_arc(payload: Arc<P>) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    /// Share the payload with a brand new, independent handle. Returns `None` if
    /// this handle is already closed (callers should raise `InvalidStateError`).
    pub fn share(&self) -> Option<Self> {
        self.payload.as_ref().map(|p| Self {
            payload: Some(Arc::clone(p)),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.payload.is_none()
    }

    /// Mark closed and release this handle's strong reference to the payload.
    /// Other clones sharing the `Arc` are unaffected; the native buffer behind it
    /// is only freed once the last clone is closed or dropped.
    pub fn close(&mut self) {
        self.payload = None;
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_deref()
    }

    pub fn payload_arc(&self) -> Option<&Arc<P>> {
        self.payload.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_payload_with_independent_close() {
        let handle = MediaHandle::new(vec![1u8, 2, 3]);
        let clone = handle.share().unwrap();
        assert_eq!(handle.payload().unwrap(), clone.payload().unwrap());

        let mut handle = handle;
        handle.close();
        assert!(handle.is_closed());
        assert!(handle.payload().is_none());

        // The clone is unaffected.
        assert!(!clone.is_closed());
        assert_eq!(clone.payload().unwrap(), &vec![1u8, 2, 3]);
    }

    #[test]
    fn close_on_closed_handle_fails_to_share() {
        let mut handle = MediaHandle::new(42u32);
        handle.close();
        assert!(handle.share().is_none());
    }

    #[test]
    fn payload_freed_only_after_last_clone_closes() {
        let handle = MediaHandle::new(String::from("payload"));
        let arc = Arc::clone(handle.payload_arc().unwrap());
        let clone = handle.share().unwrap();
        let mut handle = handle;
        handle.close();
        assert_eq!(Arc::strong_count(&arc), 2); // `arc` + `clone`
        let mut clone = clone;
        clone.close();
        assert_eq!(Arc::strong_count(&arc), 1); // only our local `arc` left
    }
}
