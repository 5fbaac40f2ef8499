//! Schedules: labelled set graphs with a cached, conflict-aware parallel
//! execution plan.

pub mod condition;
mod config;
mod executor;
mod label;
mod runner;
#[allow(clippy::module_inception)]
mod schedule;

pub use config::{
    ConfigIsSetLabel, ConfigIsSystem, IntoCondition, IntoSystemSetConfigs, SystemSetConfig,
};
pub use executor::{Executors, MultiThread, SingleThread};
pub use label::{
    AsExecutorLabel, AsScheduleLabel, AsSystemSetLabel, ExecutorLabel, IntoSystemSetLabel,
    IsSetLabel, IsSystemFunction, ScheduleLabel, SystemSetLabel,
};
pub use schedule::{
    RunScheduleError, Schedule, ScheduleCommand, ScheduleConfig, ScheduleNotFound,
    SchedulePrepareError, Schedules, SystemSet,
};
