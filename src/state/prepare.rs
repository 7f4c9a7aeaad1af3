//! Server-side prepare lifecycle of a command.

use std::sync::Arc;

use crate::protocol::types::FormatCode;
use crate::response::RowDescription;
use crate::types::PgType;

use super::bind::{BindMessage, ExecuteMessage};

/// Everything a V3-prepared command reuses between executions.
#[derive(Debug, Clone)]
pub struct PreparedPlan {
    pub plan_name: String,
    pub bind: BindMessage,
    pub execute: ExecuteMessage,
    /// Describe(portal) was sent and answered during this prepared lifetime.
    pub portal_described: bool,
    /// Row shape returned by the portal describe, reused afterwards.
    pub row_description: Option<Arc<RowDescription>>,
}

impl PreparedPlan {
    /// Plan for `plan_name` whose statement describe returned `description`.
    pub fn new(plan_name: String, description: Option<&RowDescription>) -> Self {
        let bind = BindMessage::new(&plan_name, result_formats(description));
        Self {
            plan_name,
            bind,
            execute: ExecuteMessage::default(),
            portal_described: false,
            row_description: None,
        }
    }
}

/// Per-column result formats: binary where the column type supports it.
/// A statement without a result set gets a single text entry.
pub fn result_formats(description: Option<&RowDescription>) -> Vec<FormatCode> {
    match description {
        Some(desc) => desc
            .columns()
            .iter()
            .map(|c| FormatCode::preferring_binary(PgType::supports_binary_oid(c.type_oid())))
            .collect(),
        None => vec![FormatCode::Text],
    }
}

/// Prepare state of a command.
#[derive(Debug, Clone, Default)]
pub enum PrepareState {
    /// Executed with values inlined into simple-protocol text.
    #[default]
    NotPrepared,
    /// Will be prepared before its next execution.
    NeedsPrepare,
    /// Prepared with `PREPARE <plan> AS ...`; runs as `EXECUTE <plan>(...)`.
    V2Prepared { plan_name: String },
    /// Prepared with Parse; runs as Bind/Execute.
    V3Prepared(Box<PreparedPlan>),
}

impl PrepareState {
    /// Drop any server plan and go back to NeedsPrepare.
    ///
    /// A NotPrepared or NeedsPrepare state is left alone.
    pub fn unprepare(&mut self) {
        if self.is_prepared() {
            tracing::debug!(from = self.name(), "unprepared");
            *self = PrepareState::NeedsPrepare;
        }
    }

    pub fn is_prepared(&self) -> bool {
        matches!(
            self,
            PrepareState::V2Prepared { .. } | PrepareState::V3Prepared(_)
        )
    }

    pub fn needs_prepare(&self) -> bool {
        matches!(self, PrepareState::NeedsPrepare)
    }

    /// The server plan name, if prepared.
    pub fn plan_name(&self) -> Option<&str> {
        match self {
            PrepareState::V2Prepared { plan_name } => Some(plan_name),
            PrepareState::V3Prepared(plan) => Some(&plan.plan_name),
            _ => None,
        }
    }

    /// The cached row description of a V3 plan.
    pub fn row_description(&self) -> Option<&Arc<RowDescription>> {
        match self {
            PrepareState::V3Prepared(plan) => plan.row_description.as_ref(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrepareState::NotPrepared => "NotPrepared",
            PrepareState::NeedsPrepare => "NeedsPrepare",
            PrepareState::V2Prepared { .. } => "V2Prepared",
            PrepareState::V3Prepared(_) => "V3Prepared",
        }
    }
}
