use std::sync::Arc;

use crate::{
    domain::{Access, UserId},
    store::MembershipStore,
};

// ============== Authorization ==============

/// Decides who may use the bot. Evaluated on every event; nothing is cached.
#[derive(Clone)]
pub struct AccessGate {
    admin_id: UserId,
    store: Arc<dyn MembershipStore>,
}

impl AccessGate {
    pub fn new(admin_id: UserId, store: Arc<dyn MembershipStore>) -> Self {
        Self { admin_id, store }
    }

    /// The administrator wins regardless of membership.
    pub async fn authorize(&self, user_id: UserId) -> Access {
        if user_id == self.admin_id {
            return Access::Admin;
        }
        if self.store.is_member(user_id).await {
            Access::Allowed
        } else {
            Access::Denied
        }
    }
}
