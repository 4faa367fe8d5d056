//! AWS tricks for Mothball
//!
//! Each trick conserves and restores one AWS resource family. Tricks talk
//! to the provider through the official SDK clients; the clients are
//! stateless handles and are cloned freely into per-resource task closures.

pub mod ec2;
pub mod ecs;
pub mod wait;

pub use ec2::Ec2InstancesTrick;
pub use ecs::EcsServicesTrick;
pub use wait::WaitConfig;

use mothball_core::TrickRegistry;

/// Register every shipped AWS trick in its default configuration
pub fn register_defaults(registry: &mut TrickRegistry, config: &aws_config::SdkConfig) {
    registry.register(EcsServicesTrick::new(config));
    registry.register(Ec2InstancesTrick::new(config));
}
