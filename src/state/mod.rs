//! State readers
//!
//! A reader queries every object a planner looks at exactly once and returns
//! the result as a snapshot. Planners never go back to the cluster.

mod cluster;
mod realm;

pub use cluster::ClusterState;
pub use realm::RealmState;
