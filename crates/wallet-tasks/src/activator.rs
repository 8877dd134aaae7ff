use crate::board::PendingTask;
use crate::resolver::ConnectionResolver;
use crate::TaskError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wallet_core::{
    ActivatedTask, DisplayableOffer, EligibilityFlag, Navigation, SchemaNamer, WorkflowTarget,
};

/// Receives navigation directives from task activation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, navigation: Navigation);
}

/// Forwards navigations over a channel, for a presentation loop or a test to
/// drain.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    sender: mpsc::UnboundedSender<Navigation>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Navigation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, navigation: Navigation) {
        if self.sender.send(navigation).is_err() {
            warn!(event = "navigation_dropped", reason = "receiver_closed");
        }
    }
}

/// Turns a selected task into a workflow navigation.
#[derive(Clone)]
pub struct TaskActivator {
    resolver: ConnectionResolver,
    namer: Arc<SchemaNamer>,
    navigator: Arc<dyn Navigator>,
}

impl TaskActivator {
    pub fn new(
        resolver: ConnectionResolver,
        namer: Arc<SchemaNamer>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            resolver,
            namer,
            navigator,
        }
    }

    /// Resolves everything the offered workflow needs. Does not navigate.
    pub async fn activate(&self, offer: &DisplayableOffer) -> Result<ActivatedTask, TaskError> {
        let record = &offer.record;
        let connection = self.resolver.resolve(offer.connection_id()).await?;

        let message = record
            .offer_message
            .as_ref()
            .ok_or_else(|| TaskError::MalformedOffer {
                credential_id: record.id.clone(),
                reason: "offer message missing".to_string(),
            })?;
        let attributes = message.credential_preview.attribute_map();

        let schema_id = match &offer.schema_id {
            Some(schema_id) => schema_id.clone(),
            None => record
                .schema_id()
                .map_err(|err| TaskError::MalformedOffer {
                    credential_id: record.id.clone(),
                    reason: err.to_string(),
                })?,
        };
        let credential_name = self.namer.name(&schema_id);

        Ok(ActivatedTask {
            id: record.id.clone(),
            attributes,
            connection_id: offer.connection_id().to_string(),
            connection: connection.summary,
            connection_record: connection.record,
            full_record: record.clone(),
            schema_id,
            credential_name,
        })
    }

    /// Activates an offer row. Navigation happens only after every lookup
    /// succeeded.
    pub async fn activate_offer(
        &self,
        offer: &DisplayableOffer,
    ) -> Result<WorkflowTarget, TaskError> {
        let task = self.activate(offer).await?;
        info!(
            event = "offer_activated",
            credential_id = %task.id,
            connection = %task.connection.name,
            credential_name = %task.credential_name
        );
        self.navigator.navigate(Navigation::offered(task));
        Ok(WorkflowTarget::Offered)
    }

    pub fn eligibility_target(flag: &EligibilityFlag) -> Result<WorkflowTarget, TaskError> {
        WorkflowTarget::for_credential_type(&flag.credential_type).ok_or_else(|| {
            TaskError::UnrecognizedEligibilityType(flag.credential_type.as_str().to_string())
        })
    }

    /// Activates the eligibility row. An unrecognized type is reported and
    /// nothing is navigated.
    pub fn activate_eligibility(&self, flag: &EligibilityFlag) -> Option<WorkflowTarget> {
        match Self::eligibility_target(flag) {
            Ok(target) => {
                info!(
                    event = "eligibility_activated",
                    credential_type = %flag.credential_type,
                    route = target.route()
                );
                self.navigator.navigate(Navigation::workflow(target));
                Some(target)
            }
            Err(err) => {
                warn!(event = "eligibility_activation_skipped", error = %err);
                None
            }
        }
    }

    pub async fn activate_task(
        &self,
        task: &PendingTask,
    ) -> Result<Option<WorkflowTarget>, TaskError> {
        match task {
            PendingTask::Eligibility(flag) => Ok(self.activate_eligibility(flag)),
            PendingTask::CredentialOffer(offer) => self.activate_offer(offer).await.map(Some),
        }
    }
}
