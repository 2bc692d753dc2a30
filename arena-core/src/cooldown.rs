//! Permission flags with generation-tokened re-enables.
//!
//! Revoking a permission bumps its generation and schedules a re-enable tagged
//! with that generation. Any later revoke or grant bumps the generation again,
//! so an older re-enable finds a stale token and does nothing. Deferred tasks
//! are drained between ticks, before the decision pass starts.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    DropDevice,
    SpecialAbility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permission {
    allowed: bool,
    generation: u64,
}

impl Permission {
    pub fn new(allowed: bool) -> Self {
        Self {
            allowed,
            generation: 0,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Returns the generation a matching re-enable must carry.
    pub fn revoke(&mut self) -> u64 {
        self.allowed = false;
        self.generation += 1;
        self.generation
    }

    pub fn grant(&mut self) {
        self.allowed = true;
        self.generation += 1;
    }

    /// Re-enable only if nothing has touched the permission since `generation`.
    pub fn grant_if_current(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.allowed = true;
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub drop_device: Permission,
    pub special_ability: Permission,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            drop_device: Permission::new(true),
            special_ability: Permission::new(true),
        }
    }
}

impl Permissions {
    pub fn get_mut(&mut self, kind: PermissionKind) -> &mut Permission {
        match kind {
            PermissionKind::DropDevice => &mut self.drop_device,
            PermissionKind::SpecialAbility => &mut self.special_ability,
        }
    }

    pub fn get(&self, kind: PermissionKind) -> &Permission {
        match kind {
            PermissionKind::DropDevice => &self.drop_device,
            PermissionKind::SpecialAbility => &self.special_ability,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeferredGrant {
    pub kind: PermissionKind,
    pub due_ms: u64,
    pub generation: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DeferredQueue {
    pending: Vec<DeferredGrant>,
}

impl DeferredQueue {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Revoke `kind` now and re-enable it at `due_ms` unless superseded.
    pub fn revoke_until(&mut self, permissions: &mut Permissions, kind: PermissionKind, due_ms: u64) {
        let generation = permissions.get_mut(kind).revoke();
        self.pending.push(DeferredGrant {
            kind,
            due_ms,
            generation,
        });
    }

    /// Fire every grant due at `now_ms`, oldest first. Returns the grants that
    /// actually re-enabled a permission.
    pub fn run_due(&mut self, permissions: &mut Permissions, now_ms: u64) -> Vec<DeferredGrant> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|grant| grant.due_ms <= now_ms);
        self.pending = pending;
        due.sort_by_key(|grant| grant.due_ms);
        due.into_iter()
            .filter(|grant| {
                permissions
                    .get_mut(grant.kind)
                    .grant_if_current(grant.generation)
            })
            .collect()
    }
}

/// Minimum spacing between events on the snapshot clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiter {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl RateLimiter {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    pub fn is_ready(&self, now_ms: u64) -> bool {
        self.last_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.interval_ms)
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }

    /// Mark and return true when ready; otherwise leave untouched.
    pub fn try_mark(&mut self, now_ms: u64) -> bool {
        if !self.is_ready(now_ms) {
            return false;
        }
        self.mark(now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_enable_fires_after_delay() {
        let mut permissions = Permissions::default();
        let mut queue = DeferredQueue::default();
        queue.revoke_until(&mut permissions, PermissionKind::DropDevice, 2_000);
        assert!(!permissions.drop_device.is_allowed());
        assert!(queue.run_due(&mut permissions, 1_999).is_empty());
        assert_eq!(queue.run_due(&mut permissions, 2_000).len(), 1);
        assert!(permissions.drop_device.is_allowed());
        assert!(queue.is_empty());
    }

    #[test]
    fn superseded_re_enable_is_a_no_op() {
        let mut permissions = Permissions::default();
        let mut queue = DeferredQueue::default();
        queue.revoke_until(&mut permissions, PermissionKind::DropDevice, 1_000);
        queue.revoke_until(&mut permissions, PermissionKind::DropDevice, 3_000);

        // The first timer fires while the second drop's cooldown is still live.
        assert!(queue.run_due(&mut permissions, 1_500).is_empty());
        assert!(!permissions.drop_device.is_allowed());

        let fired = queue.run_due(&mut permissions, 3_000);
        assert_eq!(fired.len(), 1);
        assert!(permissions.drop_device.is_allowed());
    }

    #[test]
    fn explicit_grant_invalidates_pending_timer() {
        let mut permissions = Permissions::default();
        let mut queue = DeferredQueue::default();
        queue.revoke_until(&mut permissions, PermissionKind::SpecialAbility, 6_000);
        permissions.special_ability.grant();
        permissions.special_ability.revoke();
        assert!(queue.run_due(&mut permissions, 6_000).is_empty());
        assert!(!permissions.special_ability.is_allowed());
    }

    #[test]
    fn rate_limiter_spacing() {
        let mut limiter = RateLimiter::new(500);
        assert!(limiter.try_mark(100));
        assert!(!limiter.try_mark(599));
        assert!(limiter.try_mark(600));
    }
}
