//! ECS services trick
//!
//! Conserving scales every matching service to a desired count of zero and
//! pins its Application Auto Scaling targets to 0/0 so the scaler cannot
//! fight the change; restoring puts the captured bounds back first and then
//! the desired count.

use crate::wait::{WaitConfig, wait_until};
use async_trait::async_trait;
use aws_sdk_applicationautoscaling::types::{ScalableDimension, ServiceNamespace};
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::ServiceField;
use mothball_core::{Conserved, Result, TagFilter, Trick, TrickError};
use mothball_task::{Task, TaskOutcome, TaskScope};
use serde::{Deserialize, Serialize};

const MACHINE_NAME: &str = "ecs-services";
const DESCRIBE_BATCH: usize = 10;

/// Captured pre-change configuration for every matched service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcsServicesState {
    pub services: Vec<EcsServiceState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcsServiceState {
    pub cluster_arn: String,
    pub service_arn: String,
    pub service_name: String,
    pub desired_count: i32,
    pub scalable_targets: Vec<ScalableTargetState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalableTargetState {
    pub resource_id: String,
    pub scalable_dimension: String,
    pub min_capacity: i32,
    pub max_capacity: i32,
}

/// Scales tagged ECS services to zero and back
pub struct EcsServicesTrick {
    ecs: aws_sdk_ecs::Client,
    autoscaling: aws_sdk_applicationautoscaling::Client,
    wait: WaitConfig,
}

impl EcsServicesTrick {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            ecs: aws_sdk_ecs::Client::new(config),
            autoscaling: aws_sdk_applicationautoscaling::Client::new(config),
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    async fn list_cluster_arns(&self) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .ecs
                .list_clusters()
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| {
                    TrickError::Discovery(format!("ListClusters: {}", DisplayErrorContext(e)))
                })?;
            arns.extend(output.cluster_arns().iter().cloned());
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        tracing::debug!("found {} ECS clusters", arns.len());
        Ok(arns)
    }

    async fn list_service_arns(&self, cluster_arn: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .ecs
                .list_services()
                .cluster(cluster_arn)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| {
                    TrickError::Discovery(format!("ListServices: {}", DisplayErrorContext(e)))
                })?;
            arns.extend(output.service_arns().iter().cloned());
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(arns)
    }

    /// Describe matching services with their tags, batching by the API limit
    async fn describe_matching(
        &self,
        cluster_arn: &str,
        service_arns: &[String],
        tags: &TagFilter,
    ) -> Result<Vec<EcsServiceState>> {
        let mut matched = Vec::new();
        for chunk in service_arns.chunks(DESCRIBE_BATCH) {
            let output = self
                .ecs
                .describe_services()
                .cluster(cluster_arn)
                .set_services(Some(chunk.to_vec()))
                .include(ServiceField::Tags)
                .send()
                .await
                .map_err(|e| {
                    TrickError::Discovery(format!("DescribeServices: {}", DisplayErrorContext(e)))
                })?;

            for service in output.services() {
                let service_tags: Vec<(&str, &str)> = service
                    .tags()
                    .iter()
                    .filter_map(|t| Some((t.key()?, t.value()?)))
                    .collect();
                if !tags.matches(service_tags) {
                    continue;
                }

                let service_arn = service
                    .service_arn()
                    .ok_or_else(|| TrickError::Discovery("service without an ARN".into()))?;
                let service_name = service
                    .service_name()
                    .ok_or_else(|| TrickError::Discovery("service without a name".into()))?;

                let scalable_targets = self
                    .describe_scalable_targets(cluster_arn, service_name)
                    .await?;

                matched.push(EcsServiceState {
                    cluster_arn: cluster_arn.to_string(),
                    service_arn: service_arn.to_string(),
                    service_name: service_name.to_string(),
                    desired_count: service.desired_count,
                    scalable_targets,
                });
            }
        }
        Ok(matched)
    }

    async fn describe_scalable_targets(
        &self,
        cluster_arn: &str,
        service_name: &str,
    ) -> Result<Vec<ScalableTargetState>> {
        let resource_id = scaling_resource_id(cluster_arn, service_name)?;
        let output = self
            .autoscaling
            .describe_scalable_targets()
            .service_namespace(ServiceNamespace::Ecs)
            .resource_ids(resource_id)
            .send()
            .await
            .map_err(|e| {
                TrickError::Discovery(format!(
                    "DescribeScalableTargets: {}",
                    DisplayErrorContext(e)
                ))
            })?;

        let mut targets = Vec::new();
        for target in output.scalable_targets() {
            targets.push(ScalableTargetState {
                resource_id: target
                    .resource_id()
                    .ok_or_else(|| TrickError::Discovery("scalable target without an id".into()))?
                    .to_string(),
                scalable_dimension: target
                    .scalable_dimension()
                    .ok_or_else(|| {
                        TrickError::Discovery("scalable target without a dimension".into())
                    })?
                    .as_str()
                    .to_string(),
                min_capacity: target.min_capacity().unwrap_or_default(),
                max_capacity: target.max_capacity().unwrap_or_default(),
            });
        }
        Ok(targets)
    }
}

#[async_trait]
impl Trick for EcsServicesTrick {
    type State = EcsServicesState;

    fn machine_name(&self) -> &'static str {
        MACHINE_NAME
    }

    fn display_name(&self) -> &str {
        "ECS services"
    }

    fn can_be_concurrent(&self) -> bool {
        true
    }

    async fn conserve(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        tags: &TagFilter,
    ) -> Result<Conserved<EcsServicesState>> {
        scope.progress("listing ECS clusters");
        let clusters = self.list_cluster_arns().await?;

        let mut recorded = Vec::new();
        let mut tasks = Vec::new();
        for cluster_arn in clusters {
            let service_arns = self.list_service_arns(&cluster_arn).await?;
            if service_arns.is_empty() {
                continue;
            }
            scope.progress(format!(
                "describing {} services in {}",
                service_arns.len(),
                cluster_arn
            ));
            for record in self.describe_matching(&cluster_arn, &service_arns, tags).await? {
                tasks.push(conserve_task(
                    self.ecs.clone(),
                    self.autoscaling.clone(),
                    self.wait.clone(),
                    record.clone(),
                    dry_run,
                ));
                recorded.push(record);
            }
        }

        Ok(Conserved::new(EcsServicesState { services: recorded }, tasks))
    }

    async fn restore(
        &self,
        _scope: &TaskScope,
        dry_run: bool,
        state: EcsServicesState,
    ) -> Result<Vec<Task>> {
        Ok(state
            .services
            .into_iter()
            .map(|record| {
                restore_task(
                    self.ecs.clone(),
                    self.autoscaling.clone(),
                    self.wait.clone(),
                    record,
                    dry_run,
                )
            })
            .collect())
    }
}

fn conserve_task(
    ecs: aws_sdk_ecs::Client,
    autoscaling: aws_sdk_applicationautoscaling::Client,
    wait: WaitConfig,
    record: EcsServiceState,
    dry_run: bool,
) -> Task {
    Task::action(record.service_name.clone(), move |scope| async move {
        if dry_run {
            return Ok(TaskOutcome::skipped("dry-run"));
        }
        if record.desired_count == 0 {
            return Ok(TaskOutcome::skipped("already at zero"));
        }

        for target in &record.scalable_targets {
            scope.progress(format!("pinning scalable target {} to 0/0", target.resource_id));
            register_scalable_target(&autoscaling, target, 0, 0).await?;
        }

        scope.progress(format!(
            "scaling {} from {} to 0",
            record.service_name, record.desired_count
        ));
        ecs.update_service()
            .cluster(&record.cluster_arn)
            .service(&record.service_arn)
            .desired_count(0)
            .send()
            .await
            .map_err(|e| mutation_error(&record.service_name, e))?;

        wait_for_running_count(&ecs, &wait, &record, 0).await?;
        Ok(TaskOutcome::Completed)
    })
}

fn restore_task(
    ecs: aws_sdk_ecs::Client,
    autoscaling: aws_sdk_applicationautoscaling::Client,
    wait: WaitConfig,
    record: EcsServiceState,
    dry_run: bool,
) -> Task {
    Task::action(record.service_name.clone(), move |scope| async move {
        let output = ecs
            .describe_services()
            .cluster(&record.cluster_arn)
            .services(&record.service_arn)
            .send()
            .await
            .map_err(|e| {
                TrickError::Discovery(format!("DescribeServices: {}", DisplayErrorContext(e)))
            })?;

        let Some(service) = output.services().first() else {
            scope.warn(format!(
                "service {} no longer exists, skipping",
                record.service_name
            ));
            return Ok(TaskOutcome::skipped("service no longer exists"));
        };

        if service.desired_count == record.desired_count {
            return Ok(TaskOutcome::skipped("already at desired count"));
        }
        if dry_run {
            return Ok(TaskOutcome::skipped("dry-run"));
        }

        // bounds go back first so the scaler cannot override the count
        for target in &record.scalable_targets {
            scope.progress(format!(
                "restoring scalable target {} to {}/{}",
                target.resource_id, target.min_capacity, target.max_capacity
            ));
            register_scalable_target(
                &autoscaling,
                target,
                target.min_capacity,
                target.max_capacity,
            )
            .await?;
        }

        scope.progress(format!(
            "scaling {} back to {}",
            record.service_name, record.desired_count
        ));
        ecs.update_service()
            .cluster(&record.cluster_arn)
            .service(&record.service_arn)
            .desired_count(record.desired_count)
            .send()
            .await
            .map_err(|e| mutation_error(&record.service_name, e))?;

        wait_for_running_count(&ecs, &wait, &record, record.desired_count).await?;
        Ok(TaskOutcome::Completed)
    })
}

async fn register_scalable_target(
    autoscaling: &aws_sdk_applicationautoscaling::Client,
    target: &ScalableTargetState,
    min: i32,
    max: i32,
) -> Result<()> {
    autoscaling
        .register_scalable_target()
        .service_namespace(ServiceNamespace::Ecs)
        .resource_id(&target.resource_id)
        .scalable_dimension(ScalableDimension::from(target.scalable_dimension.as_str()))
        .min_capacity(min)
        .max_capacity(max)
        .send()
        .await
        .map_err(|e| mutation_error(&target.resource_id, e))?;
    Ok(())
}

async fn wait_for_running_count(
    ecs: &aws_sdk_ecs::Client,
    wait: &WaitConfig,
    record: &EcsServiceState,
    expected: i32,
) -> Result<()> {
    wait_until(&record.service_name, wait, || {
        let ecs = ecs.clone();
        let cluster = record.cluster_arn.clone();
        let service = record.service_arn.clone();
        async move {
            let output = ecs
                .describe_services()
                .cluster(&cluster)
                .services(&service)
                .send()
                .await
                .map_err(|e| {
                    TrickError::Discovery(format!("DescribeServices: {}", DisplayErrorContext(e)))
                })?;
            Ok(output
                .services()
                .first()
                .is_some_and(|s| s.running_count == expected))
        }
    })
    .await
}

fn mutation_error<E>(resource: &str, error: E) -> TrickError
where
    E: std::error::Error + Send + Sync + 'static,
{
    TrickError::Mutation {
        resource: resource.to_string(),
        reason: format!("{}", DisplayErrorContext(error)),
    }
}

/// Application Auto Scaling resource id: `service/<cluster-name>/<service-name>`
fn scaling_resource_id(cluster_arn: &str, service_name: &str) -> Result<String> {
    let cluster_name = cluster_arn.rsplit('/').next().filter(|s| !s.is_empty()).ok_or_else(|| {
        TrickError::Discovery(format!("cannot parse cluster name from '{cluster_arn}'"))
    })?;
    Ok(format!("service/{cluster_name}/{service_name}"))
}
