// Per-service mutual exclusion for lifecycle operations

use std::sync::Arc;

use dashmap::DashSet;

/// At most one in-flight lifecycle operation per service name.
pub trait OperationGuard: Send + Sync {
    /// Non-blocking; `true` means the caller now owns the service until `release`.
    fn try_acquire(&self, service: &str) -> bool;

    /// Idempotent. Releasing a name that is not held is a no-op.
    fn release(&self, service: &str);
}

#[derive(Debug, Default)]
pub struct ServiceLocks {
    held: DashSet<String>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, service: &str) -> bool {
        self.held.contains(service)
    }
}

impl OperationGuard for ServiceLocks {
    fn try_acquire(&self, service: &str) -> bool {
        // insert is check-and-set under the shard lock
        self.held.insert(service.to_string())
    }

    fn release(&self, service: &str) {
        self.held.remove(service);
    }
}

/// Ownership of one service's guard slot, released on drop. Dropping also
/// happens during unwinding, so a panicking holder cannot leak the slot.
pub struct ServiceLease {
    guard: Arc<dyn OperationGuard>,
    service: String,
}

impl ServiceLease {
    pub fn acquire(guard: Arc<dyn OperationGuard>, service: &str) -> Option<Self> {
        guard.try_acquire(service).then(|| Self {
            guard,
            service: service.to_string(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        self.guard.release(&self.service);
        tracing::trace!(service = %self.service, "service lease released");
    }
}

impl std::fmt::Debug for ServiceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLease")
            .field("service", &self.service)
            .finish()
    }
}
