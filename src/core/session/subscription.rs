use crate::core::communication::Line;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Single-subscriber fan-out point between the line pump and an exchange.
///
/// Delivery and unsubscription take the same lock, so once
/// [`LineStream::unsubscribe`] returns no further line reaches that stream.
#[derive(Debug, Default)]
pub struct SubscriberSlot {
    inner: Mutex<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    open: bool,
    next_id: u64,
    current: Option<(u64, mpsc::UnboundedSender<Line>)>,
    discarded: u64,
}

impl SubscriberSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow subscriptions again after the session (re)opened
    pub(crate) fn open(&self) {
        self.inner.lock().open = true;
    }

    /// End the current stream and refuse new ones until reopened
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.current = None;
    }

    /// Register a new subscriber, replacing any previous one.
    ///
    /// On a closed slot the returned stream is already ended.
    pub fn subscribe(self: &Arc<Self>) -> LineStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        if inner.open {
            inner.current = Some((id, sender));
        }

        LineStream {
            id,
            receiver,
            slot: Arc::clone(self),
            subscribed: true,
        }
    }

    /// A stream that yields nothing and never takes the slot
    pub fn ended(self: &Arc<Self>) -> LineStream {
        let (_, receiver) = mpsc::unbounded_channel();

        LineStream {
            id: 0,
            receiver,
            slot: Arc::clone(self),
            subscribed: false,
        }
    }

    /// Hand a line to the current subscriber, or give it back if there is none.
    pub(crate) fn deliver(&self, line: Line) -> Result<(), Line> {
        let mut inner = self.inner.lock();
        let Some((_, sender)) = inner.current.as_ref() else {
            return Err(line);
        };
        match sender.send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(line)) => {
                inner.current = None;
                Err(line)
            }
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.inner.lock().current.is_some()
    }

    /// Lines that were delivered but never read before their stream unsubscribed
    pub fn discarded(&self) -> u64 {
        self.inner.lock().discarded
    }

    fn record_discarded(&self, count: u64) {
        if count > 0 {
            self.inner.lock().discarded += count;
        }
    }

    fn remove(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.current.as_ref().is_some_and(|(current, _)| *current == id) {
            inner.current = None;
        }
    }
}

/// Lazy, non-restartable sequence of lines in arrival order.
///
/// Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct LineStream {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Line>,
    slot: Arc<SubscriberSlot>,
    subscribed: bool,
}

impl LineStream {
    /// Next line, or `None` once the stream has ended or was unsubscribed
    /// and its buffer is empty.
    pub async fn next(&mut self) -> Option<Line> {
        self.receiver.recv().await
    }

    /// Stop receiving. Idempotent.
    ///
    /// Lines already delivered but not yet read are dropped and counted in
    /// [`SubscriberSlot::discarded`].
    pub fn unsubscribe(&mut self) {
        if self.subscribed {
            self.slot.remove(self.id);
            self.receiver.close();
            self.subscribed = false;

            let mut unread = 0;
            while self.receiver.try_recv().is_ok() {
                unread += 1;
            }
            self.slot.record_discarded(unread);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_slot() -> Arc<SubscriberSlot> {
        let slot = Arc::new(SubscriberSlot::new());
        slot.open();
        slot
    }

    #[tokio::test]
    async fn test_delivery_in_order() {
        let slot = open_slot();
        let mut stream = slot.subscribe();

        assert!(slot.deliver(Line::new("one")).is_ok());
        assert!(slot.deliver(Line::new("two")).is_ok());

        assert_eq!(stream.next().await, Some(Line::new("one")));
        assert_eq!(stream.next().await, Some(Line::new("two")));
    }

    #[tokio::test]
    async fn test_no_subscriber_returns_line() {
        let slot = open_slot();
        let rejected = slot.deliver(Line::new("URC")).unwrap_err();
        assert_eq!(rejected.as_str(), "URC");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let slot = open_slot();
        let mut stream = slot.subscribe();
        stream.unsubscribe();

        assert!(!slot.has_subscriber());
        assert!(slot.deliver(Line::new("late")).is_err());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let slot = open_slot();
        {
            let _stream = slot.subscribe();
            assert!(slot.has_subscriber());
        }
        assert!(!slot.has_subscriber());
    }

    #[tokio::test]
    async fn test_stale_stream_does_not_remove_newer_subscriber() {
        let slot = open_slot();
        let mut first = slot.subscribe();
        let mut second = slot.subscribe();

        first.unsubscribe();
        assert!(slot.has_subscriber());

        assert!(slot.deliver(Line::new("x")).is_ok());
        assert_eq!(second.next().await, Some(Line::new("x")));
        assert_eq!(first.next().await, None);
    }

    #[tokio::test]
    async fn test_unread_lines_counted_on_unsubscribe() {
        let slot = open_slot();
        let mut stream = slot.subscribe();

        slot.deliver(Line::new("OK")).unwrap();
        slot.deliver(Line::new("late")).unwrap();
        assert_eq!(stream.next().await, Some(Line::new("OK")));

        stream.unsubscribe();
        stream.unsubscribe();
        assert_eq!(slot.discarded(), 1);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_ended_stream_leaves_subscriber_alone() {
        let slot = open_slot();
        let mut live = slot.subscribe();

        let mut ended = slot.ended();
        assert!(!ended.is_subscribed());
        assert_eq!(ended.next().await, None);
        drop(ended);

        assert!(slot.has_subscriber());
        slot.deliver(Line::new("kept")).unwrap();
        assert_eq!(live.next().await, Some(Line::new("kept")));
    }

    #[tokio::test]
    async fn test_closed_slot_yields_ended_stream() {
        let slot = Arc::new(SubscriberSlot::new());
        let mut stream = slot.subscribe();
        assert_eq!(stream.next().await, None);

        let slot = open_slot();
        let mut live = slot.subscribe();
        slot.close();
        assert_eq!(live.next().await, None);
    }
}
