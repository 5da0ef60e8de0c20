//! Structural and semantic validation of request primitives.

pub mod children;
pub mod policy;

pub use children::{allowed_children, can_host_subscriptions, is_possible_child};

use crate::error::CseError;
use crate::primitive::{Operation, RequestPrimitive, ResourceType, ResultContent};
use crate::resource::{unwrap_content, VirtualResource};
use thiserror::Error;

/// Validation errors for request primitives
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("empty request identifier")]
    EmptyRequestId,

    #[error("empty request originator")]
    EmptyOriginator,

    #[error("empty target (resource path)")]
    EmptyTarget,

    #[error("invalid ResultContent type: {0}")]
    InvalidResultContent(ResultContent),

    #[error("invalid operation on '{0}' virtual resource: {1}")]
    VirtualOperation(VirtualResource, Operation),

    #[error("invalid parent resource type for '{0}': {1}")]
    VirtualParent(VirtualResource, ResourceType),

    #[error("missing resource type attribute for the operation '{0}'")]
    MissingResourceType(Operation),

    #[error("inconsistent resource structure for the operation '{0}'")]
    InconsistentResourceType(Operation),

    #[error("'{0}' resource is not allowed for '{1}' operation")]
    OperationNotAllowed(ResourceType, Operation),

    #[error("missing resource structure for '{0}' operation")]
    MissingContent(Operation),

    #[error("{0}")]
    MalformedContent(String),

    #[error("resource attribute violation(s): {}", .0.join(", "))]
    AttributeViolations(Vec<String>),
}

impl From<ValidationError> for CseError {
    fn from(err: ValidationError) -> Self {
        CseError::Validation(err.to_string())
    }
}

/// Validates `rqp` before it reaches the CRUD engine.
///
/// `target` is the type of the resource the operation acts on: the parent for
/// Create and for virtual resources, otherwise the addressed resource. It is
/// `None` only when the target could not be resolved locally.
///
/// Rules are checked in order and the first violation is returned:
/// - request id, originator and target are present
/// - result content is allowed for the operation (defaults to Attributes)
/// - `/la`, `/ol` accept only Retrieve/Delete without filter criteria and
///   `/fopt` only exists under a group
/// - resource type is given on Create and consistent on Update
/// - CSEBase is only retrievable and contentInstance is never updatable
/// - content is present on Create/Update and obeys the attribute table
pub fn check_request(
    rqp: &RequestPrimitive,
    target: Option<ResourceType>,
) -> Result<(), ValidationError> {
    if rqp.rqi.trim().is_empty() {
        return Err(ValidationError::EmptyRequestId);
    }
    if rqp.fr.trim().is_empty() {
        return Err(ValidationError::EmptyOriginator);
    }
    if rqp.to.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    check_result_content(rqp.op, rqp.result_content())?;

    if let (_, Some(vr)) = VirtualResource::split(&rqp.to) {
        check_virtual(rqp, vr, target)?;
    }

    let ty = effective_type(rqp, target)?;

    if let Some(ty) = ty {
        match ty {
            ResourceType::CseBase if rqp.op != Operation::Retrieve => {
                return Err(ValidationError::OperationNotAllowed(ty, rqp.op));
            }
            ResourceType::ContentInstance if rqp.op == Operation::Update => {
                return Err(ValidationError::OperationNotAllowed(ty, rqp.op));
            }
            _ => {}
        }
    }

    if matches!(rqp.op, Operation::Create | Operation::Update) {
        let Some(pc) = &rqp.pc else {
            return Err(ValidationError::MissingContent(rqp.op));
        };
        if let Some(ty) = ty {
            let body = unwrap_content(ty, pc)
                .map_err(|e| ValidationError::MalformedContent(e.to_string()))?;
            let violations = policy::violations(rqp.op, ty, &body);
            if !violations.is_empty() {
                return Err(ValidationError::AttributeViolations(violations));
            }
        }
    }

    Ok(())
}

pub fn check_result_content(op: Operation, rcn: ResultContent) -> Result<(), ValidationError> {
    let allowed = match rcn {
        ResultContent::Nothing => op != Operation::Retrieve,
        ResultContent::AttributesAndChildResources => op == Operation::Retrieve,
        ResultContent::HierarchicalAddress | ResultContent::HierarchicalAddressAndAttributes => {
            op == Operation::Create
        }
        _ => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(ValidationError::InvalidResultContent(rcn))
    }
}

fn check_virtual(
    rqp: &RequestPrimitive,
    vr: VirtualResource,
    parent: Option<ResourceType>,
) -> Result<(), ValidationError> {
    if matches!(vr, VirtualResource::Latest | VirtualResource::Oldest)
        && (!matches!(rqp.op, Operation::Retrieve | Operation::Delete) || rqp.fc.is_some())
    {
        return Err(ValidationError::VirtualOperation(vr, rqp.op));
    }
    if let Some(parent) = parent {
        if !vr.allowed_under(parent) {
            return Err(ValidationError::VirtualParent(vr, parent));
        }
    }
    Ok(())
}

/// The type whose rules apply: the declared type on Create, the target's
/// type otherwise.
fn effective_type(
    rqp: &RequestPrimitive,
    target: Option<ResourceType>,
) -> Result<Option<ResourceType>, ValidationError> {
    match rqp.op {
        Operation::Create => match rqp.ty {
            Some(ty) => Ok(Some(ty)),
            None => Err(ValidationError::MissingResourceType(rqp.op)),
        },
        Operation::Update => match (rqp.ty, target) {
            (Some(declared), Some(actual)) if declared != actual => {
                Err(ValidationError::InconsistentResourceType(rqp.op))
            }
            (declared, actual) => match declared.or(actual) {
                Some(ty) => Ok(Some(ty)),
                None => Err(ValidationError::InconsistentResourceType(rqp.op)),
            },
        },
        _ => Ok(target),
    }
}

#[cfg(test)]
mod tests;
