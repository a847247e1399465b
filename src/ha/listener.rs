//! Promotion callback

/// Notified after this node becomes master.
///
/// Called with the coordinator's cycle lock held; implementations must not
/// call back into the coordinator that notifies them.
pub trait PromotionListener: Send + Sync {
    fn promoted_to_master(&self, node_id: &str);
}

impl<F> PromotionListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn promoted_to_master(&self, node_id: &str) {
        self(node_id)
    }
}
