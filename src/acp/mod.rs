//! Access control: policy enforcement (ancestor walk to the governing
//! policies) and policy decision (privilege evaluation).

use crate::error::{CseError, CseResult};
use crate::primitive::{ResourceType, DISCOVER_MASK_BIT};
use crate::primitive::{Operation, RequestPrimitive};
use crate::resource::{AccessControlRule, Resource};
use crate::store::ResourceStore;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decision taken when the ancestor walk reaches the root without finding
/// any policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootPolicy {
    Allow,
    Deny,
}

impl Default for RootPolicy {
    fn default() -> Self {
        RootPolicy::Deny
    }
}

/// `acop` bit required for `rqp`.
pub fn required_bit(rqp: &RequestPrimitive) -> u32 {
    if rqp.op == Operation::Retrieve && rqp.is_discovery() {
        DISCOVER_MASK_BIT
    } else {
        rqp.op.mask_bit()
    }
}

fn is_registration(rqp: &RequestPrimitive, target: &Resource) -> bool {
    rqp.op == Operation::Create
        && target.ty == ResourceType::CseBase
        && matches!(rqp.ty, Some(ResourceType::Ae) | Some(ResourceType::RemoteCse))
}

/// Whether any privilege entry grants `bit` to `originator`.
pub fn policy_decision_point(rules: &[AccessControlRule], originator: &str, bit: u32) -> bool {
    let originator = originator.trim();
    rules.iter().any(|rule| {
        rule.acop & bit != 0
            && rule
                .acor
                .iter()
                .any(|acor| acor == "*" || acor.trim() == originator)
    })
}

fn is_creator(res: &Resource, originator: &str) -> bool {
    res.cr.as_deref().map(str::trim) == Some(originator.trim())
}

pub struct AccessControl {
    store: Arc<dyn ResourceStore>,
    root_policy: RootPolicy,
    /// Originators never subject to policy (the CSE itself, administrators)
    trusted: HashSet<String>,
}

impl AccessControl {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        root_policy: RootPolicy,
        trusted: impl IntoIterator<Item = String>,
    ) -> Self {
        let trusted = trusted
            .into_iter()
            .flat_map(|id| {
                let bare = id.trim_start_matches('/').to_string();
                [format!("/{}", bare), bare]
            })
            .collect();
        Self {
            store,
            root_policy,
            trusted,
        }
    }

    pub fn is_trusted(&self, originator: &str) -> bool {
        self.trusted.contains(originator.trim())
    }

    /// Grants or denies `rqp` on `target`, the addressed resource (the
    /// parent for Create). Delete is decided by the parent's policies.
    pub async fn enforce(&self, rqp: &RequestPrimitive, target: &Resource) -> CseResult<()> {
        let originator = rqp.fr.as_str();
        if self.is_trusted(originator) {
            return Ok(());
        }
        // Registration under the CSEBase is open unless the CSEBase itself
        // references policies.
        if is_registration(rqp, target) && target.acpi.is_empty() {
            return Ok(());
        }
        let bit = required_bit(rqp);
        let granted = if rqp.op == Operation::Delete {
            self.delete_permitted(target, originator, bit).await?
        } else {
            self.policy_enforcement_point(target, originator, bit).await?
        };
        if granted {
            Ok(())
        } else {
            debug!(target = %target.path, originator = %originator, bit, "Access denied");
            Err(CseError::no_privilege(originator))
        }
    }

    /// Walks from `target` towards the root until a resource references
    /// policies, then evaluates those. Without policies, the creator of a
    /// resource on the way holds every privilege over its subtree.
    pub async fn policy_enforcement_point(
        &self,
        target: &Resource,
        originator: &str,
        bit: u32,
    ) -> CseResult<bool> {
        if target.ty == ResourceType::AccessControlPolicy {
            if let Some(acp) = target.policy() {
                return Ok(policy_decision_point(&acp.pvs.acr, originator, bit));
            }
        }

        let mut current = target.clone();
        loop {
            if !current.acpi.is_empty() {
                let mut resolved = 0;
                for id in &current.acpi {
                    let Some(policy) = self.load_policy(id).await else {
                        warn!(acpi = %id, resource = %current.path, "Referenced policy not found");
                        continue;
                    };
                    resolved += 1;
                    if let Some(acp) = policy.policy() {
                        if policy_decision_point(&acp.pv.acr, originator, bit) {
                            return Ok(true);
                        }
                    }
                }
                if resolved > 0 {
                    return Ok(false);
                }
            }
            if is_creator(&current, originator) {
                return Ok(true);
            }
            if current.parent_path.is_empty() {
                return Ok(self.root_policy == RootPolicy::Allow);
            }
            current = match self.store.retrieve(&current.parent_path).await {
                Ok(parent) => parent,
                Err(e) => {
                    warn!(path = %current.parent_path, error = %e, "Ancestor lookup failed");
                    return Ok(self.root_policy == RootPolicy::Allow);
                }
            };
        }
    }

    /// The resource's own policies do not protect it from deletion; the
    /// walk starts at its parent. Its creator still owns it.
    async fn delete_permitted(&self, target: &Resource, originator: &str, bit: u32) -> CseResult<bool> {
        if target.parent_path.is_empty() {
            return self.policy_enforcement_point(target, originator, bit).await;
        }
        if is_creator(target, originator) {
            return Ok(true);
        }
        match self.store.retrieve(&target.parent_path).await {
            Ok(parent) => self.policy_enforcement_point(&parent, originator, bit).await,
            Err(e) => {
                warn!(path = %target.parent_path, error = %e, "Parent lookup failed");
                Ok(false)
            }
        }
    }

    async fn load_policy(&self, id: &str) -> Option<Resource> {
        let res = match self.store.retrieve_by_id(id).await {
            Ok(res) => res,
            Err(_) => self.store.retrieve(id.trim_start_matches('/')).await.ok()?,
        };
        (res.ty == ResourceType::AccessControlPolicy).then_some(res)
    }
}

#[cfg(test)]
mod tests;
