//! Idempotent setup of the messages collection and its indexes

use crate::error::StoreResult;
use crate::metrics;
use crate::schema::{message_indexes, DocumentValidator};
use crate::store::{Provisioned, SchemaAdmin};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionTarget {
    Collection(String),
    Index(String),
}

impl ProvisionTarget {
    fn kind(&self) -> &'static str {
        match self {
            ProvisionTarget::Collection(_) => "collection",
            ProvisionTarget::Index(_) => "index",
        }
    }
}

impl fmt::Display for ProvisionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionTarget::Collection(name) => write!(f, "collection {name}"),
            ProvisionTarget::Index(name) => write!(f, "index {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionStep {
    pub target: ProvisionTarget,
    pub outcome: Provisioned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub steps: Vec<ProvisionStep>,
}

impl ProvisionReport {
    pub fn created(&self) -> usize {
        self.count(Provisioned::Created)
    }

    pub fn already_existing(&self) -> usize {
        self.count(Provisioned::AlreadyExists)
    }

    /// Nothing was created; everything was already in place
    pub fn is_noop(&self) -> bool {
        self.created() == 0
    }

    pub fn log(&self) {
        for step in &self.steps {
            info!(target_name = %step.target, outcome = step.outcome.as_str(), "Provision step");
        }
        info!(
            created = self.created(),
            already_existing = self.already_existing(),
            "Provisioning complete"
        );
    }

    fn count(&self, outcome: Provisioned) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }
}

fn record(step: &ProvisionStep) {
    metrics::record_provision_step(step.target.kind(), step.outcome.as_str());
}

/// Register the collection with the message document contract
pub async fn define_schema<A>(admin: &A) -> StoreResult<ProvisionStep>
where
    A: SchemaAdmin + ?Sized,
{
    let target = ProvisionTarget::Collection(admin.namespace().to_string());

    match admin.create_collection(&DocumentValidator::message()).await {
        Ok(outcome) => {
            let step = ProvisionStep { target, outcome };
            record(&step);
            Ok(step)
        }
        Err(e) => {
            error!(namespace = %admin.namespace(), error = %e, "Failed to define collection");
            metrics::record_provision_step("collection", "error");
            Err(e)
        }
    }
}

/// Create the message indexes in order, the TTL index last
pub async fn define_indexes<A>(admin: &A, ttl: Duration) -> StoreResult<Vec<ProvisionStep>>
where
    A: SchemaAdmin + ?Sized,
{
    let collection = admin.namespace().collection().to_string();
    let mut steps = Vec::new();

    for index in message_indexes(ttl) {
        let name = index.name(&collection);
        match admin.create_index(&index).await {
            Ok(outcome) => {
                let step = ProvisionStep {
                    target: ProvisionTarget::Index(name),
                    outcome,
                };
                record(&step);
                steps.push(step);
            }
            Err(e) => {
                error!(index = %name, spec = %index, error = %e, "Failed to define index");
                metrics::record_provision_step("index", "error");
                return Err(e);
            }
        }
    }

    Ok(steps)
}

/// `define_schema` followed by `define_indexes`; safe to re-run
pub async fn provision<A>(admin: &A, ttl: Duration) -> StoreResult<ProvisionReport>
where
    A: SchemaAdmin + ?Sized,
{
    let mut report = ProvisionReport {
        steps: vec![define_schema(admin).await?],
    };
    report.steps.extend(define_indexes(admin, ttl).await?);
    Ok(report)
}
