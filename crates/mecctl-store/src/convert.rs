//! `ToSql`/text round-trips for the small enums persisted as `TEXT` columns.

use mecctl_types::model::{MigrateMethod, ServiceState};

pub fn method_to_str(m: MigrateMethod) -> &'static str {
    match m {
        MigrateMethod::PreCopy => "pre_copy",
        MigrateMethod::NonLive => "non_live",
    }
}

pub fn method_from_str(s: &str) -> MigrateMethod {
    match s {
        "non_live" => MigrateMethod::NonLive,
        _ => MigrateMethod::PreCopy,
    }
}

pub fn state_to_str(s: ServiceState) -> &'static str {
    match s {
        ServiceState::Init => "init",
        ServiceState::Running => "running",
        ServiceState::PreMigrate => "pre_migrate",
        ServiceState::PreMigrated => "pre_migrated",
        ServiceState::Migrate => "migrate",
    }
}

pub fn state_from_str(s: &str) -> ServiceState {
    match s {
        "running" => ServiceState::Running,
        "pre_migrate" => ServiceState::PreMigrate,
        "pre_migrated" => ServiceState::PreMigrated,
        "migrate" => ServiceState::Migrate,
        _ => ServiceState::Init,
    }
}
