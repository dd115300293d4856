//! Approval queue: FIFO of predictions waiting for a human decision.
//!
//! At most one request is in flight per session. The in-flight prediction is
//! kept so a response can be matched against the product it was sent for.

use std::collections::VecDeque;

use crate::aggregate::RankedPrediction;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("no approval request is outstanding")]
    NothingInFlight,

    #[error("approval for '{received}' does not match outstanding request for '{expected}'")]
    ProductMismatch { expected: String, received: String },
}

#[derive(Debug, Default)]
pub struct ApprovalQueue {
    pending: VecDeque<RankedPrediction>,
    in_flight: Option<RankedPrediction>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, prediction: RankedPrediction) {
        self.pending.push_back(prediction);
    }

    /// Promote the next pending prediction to in-flight.
    ///
    /// Returns the prediction to send to the client, or `None` when a request
    /// is already outstanding or nothing is pending.
    pub fn try_dispatch(&mut self) -> Option<&RankedPrediction> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(self.pending.pop_front()?);
        self.in_flight.as_ref()
    }

    /// Close the outstanding request with the client's answer for `product_name`.
    pub fn complete(&mut self, product_name: &str) -> Result<RankedPrediction, ApprovalError> {
        let in_flight = self.in_flight.as_ref().ok_or(ApprovalError::NothingInFlight)?;
        if in_flight.product_name != product_name {
            return Err(ApprovalError::ProductMismatch {
                expected: in_flight.product_name.clone(),
                received: product_name.to_string(),
            });
        }
        self.in_flight.take().ok_or(ApprovalError::NothingInFlight)
    }

    pub fn awaiting_approval(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&RankedPrediction> {
        self.in_flight.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(name: &str) -> RankedPrediction {
        RankedPrediction {
            product_name: name.to_string(),
            predicted_classes: vec![],
            file_paths: vec![format!("{name}.jpg")],
        }
    }

    fn dispatched(queue: &mut ApprovalQueue) -> Option<String> {
        queue.try_dispatch().map(|p| p.product_name.clone())
    }

    #[test]
    fn serves_in_fifo_order() {
        let mut queue = ApprovalQueue::new();
        queue.enqueue(prediction("p1"));
        queue.enqueue(prediction("p2"));
        queue.enqueue(prediction("p3"));

        let mut served = Vec::new();
        while let Some(name) = dispatched(&mut queue) {
            assert!(queue.awaiting_approval());
            queue.complete(&name).unwrap();
            assert!(!queue.awaiting_approval());
            served.push(name);
        }
        assert_eq!(served, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn at_most_one_in_flight() {
        let mut queue = ApprovalQueue::new();
        queue.enqueue(prediction("p1"));
        queue.enqueue(prediction("p2"));

        assert_eq!(dispatched(&mut queue).as_deref(), Some("p1"));
        assert_eq!(dispatched(&mut queue), None);
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.in_flight().unwrap().product_name, "p1");
    }

    #[test]
    fn dispatch_on_empty_is_noop() {
        let mut queue = ApprovalQueue::new();
        assert_eq!(dispatched(&mut queue), None);
        assert!(!queue.awaiting_approval());
    }

    #[test]
    fn complete_without_request_fails() {
        let mut queue = ApprovalQueue::new();
        assert_eq!(queue.complete("p1"), Err(ApprovalError::NothingInFlight));
    }

    #[test]
    fn complete_for_other_product_keeps_request() {
        let mut queue = ApprovalQueue::new();
        queue.enqueue(prediction("p1"));
        queue.try_dispatch();

        assert_eq!(
            queue.complete("p2"),
            Err(ApprovalError::ProductMismatch {
                expected: "p1".to_string(),
                received: "p2".to_string(),
            })
        );
        assert!(queue.awaiting_approval());
        assert_eq!(queue.complete("p1").unwrap().product_name, "p1");
    }

    #[test]
    fn clear_drops_everything() {
        let mut queue = ApprovalQueue::new();
        queue.enqueue(prediction("p1"));
        queue.enqueue(prediction("p2"));
        queue.try_dispatch();
        queue.clear();
        assert!(!queue.awaiting_approval());
        assert_eq!(queue.pending_len(), 0);
    }
}
