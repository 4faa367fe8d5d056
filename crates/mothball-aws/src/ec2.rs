//! EC2 instances trick
//!
//! Conserving stops every running tagged instance after recording the state
//! it was found in; restoring starts only the instances that were running
//! when conserved. EBS volumes and network interfaces survive a stop, so no
//! further configuration needs capturing.

use crate::wait::{WaitConfig, wait_until};
use async_trait::async_trait;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::Filter;
use mothball_core::{Conserved, Result, TagFilter, Trick, TrickError};
use mothball_task::{Task, TaskOutcome, TaskScope};
use serde::{Deserialize, Serialize};

const MACHINE_NAME: &str = "ec2-instances";

const STATE_RUNNING: &str = "running";
const STATE_STOPPED: &str = "stopped";

/// Instance state names worth conserving; terminated and shutting-down
/// instances cannot be brought back, so discovery filters them out
const CONSERVABLE_STATES: [&str; 4] = ["pending", "running", "stopping", "stopped"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ec2InstancesState {
    pub instances: Vec<Ec2InstanceState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ec2InstanceState {
    pub instance_id: String,
    /// Instance state name at discovery time, e.g. "running"
    pub previous_state: String,
}

/// Stops tagged EC2 instances and starts them back up
pub struct Ec2InstancesTrick {
    ec2: aws_sdk_ec2::Client,
    wait: WaitConfig,
}

impl Ec2InstancesTrick {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    async fn discover(&self, tags: &TagFilter) -> Result<Vec<Ec2InstanceState>> {
        let filters = discovery_filters(tags);
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .ec2
                .describe_instances()
                .set_filters(Some(filters.clone()))
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| {
                    TrickError::Discovery(format!("DescribeInstances: {}", DisplayErrorContext(e)))
                })?;

            for reservation in output.reservations() {
                for instance in reservation.instances() {
                    let instance_id = instance
                        .instance_id()
                        .ok_or_else(|| TrickError::Discovery("instance without an id".into()))?;
                    let previous_state = instance
                        .state()
                        .and_then(|s| s.name())
                        .ok_or_else(|| {
                            TrickError::Discovery(format!(
                                "instance {instance_id} without a state"
                            ))
                        })?
                        .as_str()
                        .to_string();

                    found.push(Ec2InstanceState {
                        instance_id: instance_id.to_string(),
                        previous_state,
                    });
                }
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        tracing::debug!("discovered {} instances", found.len());
        Ok(found)
    }
}

#[async_trait]
impl Trick for Ec2InstancesTrick {
    type State = Ec2InstancesState;

    fn machine_name(&self) -> &'static str {
        MACHINE_NAME
    }

    fn display_name(&self) -> &str {
        "EC2 instances"
    }

    fn can_be_concurrent(&self) -> bool {
        true
    }

    async fn conserve(
        &self,
        scope: &TaskScope,
        dry_run: bool,
        tags: &TagFilter,
    ) -> Result<Conserved<Ec2InstancesState>> {
        scope.progress("describing EC2 instances");
        let instances = self.discover(tags).await?;

        let mut tasks = Vec::new();
        for record in &instances {
            tasks.push(conserve_task(
                self.ec2.clone(),
                self.wait.clone(),
                record.clone(),
                dry_run,
            ));
        }

        Ok(Conserved::new(Ec2InstancesState { instances }, tasks))
    }

    async fn restore(
        &self,
        _scope: &TaskScope,
        dry_run: bool,
        state: Ec2InstancesState,
    ) -> Result<Vec<Task>> {
        Ok(state
            .instances
            .into_iter()
            .map(|record| restore_task(self.ec2.clone(), self.wait.clone(), record, dry_run))
            .collect())
    }
}

fn conserve_task(
    ec2: aws_sdk_ec2::Client,
    wait: WaitConfig,
    record: Ec2InstanceState,
    dry_run: bool,
) -> Task {
    Task::action(record.instance_id.clone(), move |scope| async move {
        if dry_run {
            return Ok(TaskOutcome::skipped("dry-run"));
        }
        if record.previous_state != STATE_RUNNING {
            return Ok(TaskOutcome::skipped(format!(
                "not running ({})",
                record.previous_state
            )));
        }

        scope.progress(format!("stopping {}", record.instance_id));
        ec2.stop_instances()
            .instance_ids(&record.instance_id)
            .send()
            .await
            .map_err(|e| mutation_error(&record.instance_id, e))?;

        wait_for_state(&ec2, &wait, &record.instance_id, STATE_STOPPED).await?;
        Ok(TaskOutcome::Completed)
    })
}

fn restore_task(
    ec2: aws_sdk_ec2::Client,
    wait: WaitConfig,
    record: Ec2InstanceState,
    dry_run: bool,
) -> Task {
    Task::action(record.instance_id.clone(), move |scope| async move {
        if record.previous_state != STATE_RUNNING {
            return Ok(TaskOutcome::skipped(format!(
                "was not running when conserved ({})",
                record.previous_state
            )));
        }

        let Some(current) = current_state(&ec2, &record.instance_id).await? else {
            scope.warn(format!(
                "instance {} no longer exists, skipping",
                record.instance_id
            ));
            return Ok(TaskOutcome::skipped("instance no longer exists"));
        };

        if current == STATE_RUNNING {
            return Ok(TaskOutcome::skipped("already running"));
        }
        if dry_run {
            return Ok(TaskOutcome::skipped("dry-run"));
        }

        scope.progress(format!("starting {}", record.instance_id));
        ec2.start_instances()
            .instance_ids(&record.instance_id)
            .send()
            .await
            .map_err(|e| mutation_error(&record.instance_id, e))?;

        wait_for_state(&ec2, &wait, &record.instance_id, STATE_RUNNING).await?;
        Ok(TaskOutcome::Completed)
    })
}

/// Current state name, or `None` when the instance is gone
///
/// Lookup goes through an `instance-id` filter instead of the id list
/// parameter: a vanished instance then yields an empty result instead of an
/// `InvalidInstanceID.NotFound` error.
async fn current_state(ec2: &aws_sdk_ec2::Client, instance_id: &str) -> Result<Option<String>> {
    let output = ec2
        .describe_instances()
        .filters(
            Filter::builder()
                .name("instance-id")
                .values(instance_id)
                .build(),
        )
        .send()
        .await
        .map_err(|e| {
            TrickError::Discovery(format!("DescribeInstances: {}", DisplayErrorContext(e)))
        })?;

    Ok(output
        .reservations()
        .iter()
        .flat_map(|r| r.instances())
        .next()
        .and_then(|i| i.state())
        .and_then(|s| s.name())
        .map(|n| n.as_str().to_string()))
}

async fn wait_for_state(
    ec2: &aws_sdk_ec2::Client,
    wait: &WaitConfig,
    instance_id: &str,
    expected: &str,
) -> Result<()> {
    wait_until(instance_id, wait, || {
        let ec2 = ec2.clone();
        let instance_id = instance_id.to_string();
        let expected = expected.to_string();
        async move {
            Ok(current_state(&ec2, &instance_id)
                .await?
                .is_some_and(|state| state == expected))
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

/// Tag pairs become server-side `tag:<key>` filters; the state filter keeps
/// unrecoverable instances out of discovery entirely
fn discovery_filters(tags: &TagFilter) -> Vec<Filter> {
    let mut filters: Vec<Filter> = tags
        .pairs()
        .iter()
        .map(|pair| {
            Filter::builder()
                .name(format!("tag:{}", pair.key))
                .values(&pair.value)
                .build()
        })
        .collect();

    let mut state_filter = Filter::builder().name("instance-state-name");
    for state in CONSERVABLE_STATES {
        state_filter = state_filter.values(state);
    }
    filters.push(state_filter.build());
    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_pairs_become_tag_filters() {
        let mut tags = TagFilter::new();
        tags.push("team", "platform");
        tags.push("env", "staging");

        let filters = discovery_filters(&tags);
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].name(), Some("tag:team"));
        assert_eq!(filters[0].values(), ["platform"]);
        assert_eq!(filters[1].name(), Some("tag:env"));
    }

    #[test]
    fn discovery_always_excludes_unrecoverable_states() {
        let filters = discovery_filters(&TagFilter::new());
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name(), Some("instance-state-name"));
        assert_eq!(
            filters[0].values(),
            ["pending", "running", "stopping", "stopped"]
        );
        assert!(!filters[0].values().contains(&"terminated".to_string()));
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = Ec2InstancesState {
            instances: vec![
                Ec2InstanceState {
                    instance_id: "i-0123456789abcdef0".into(),
                    previous_state: "running".into(),
                },
                Ec2InstanceState {
                    instance_id: "i-0fedcba9876543210".into(),
                    previous_state: "stopped".into(),
                },
            ],
        };

        let value = serde_json::to_value(&state).unwrap();
        let decoded: Ec2InstancesState = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.instances.len(), 2);
        assert_eq!(decoded.instances[0].previous_state, "running");
    }
}
