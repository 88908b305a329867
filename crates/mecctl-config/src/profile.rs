use std::path::Path;

use serde::Deserialize;

use mecctl_types::model::{BaseStation, Server};

use crate::error::{ConfigError, Result};

/// One edge server row in a `--profile_file` topology YAML (§4.0 Configuration):
/// the bootstrap-time equivalent of a `register` message, used to seed the store
/// before any edge agent connects.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileServer {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub distance: u32,
    #[serde(default)]
    pub core_count: u32,
    #[serde(default)]
    pub cpu_max_mhz: f64,
    #[serde(default)]
    pub ram_mb: f64,
    #[serde(default)]
    pub disk_mb: f64,
    pub bs: Option<String>,
    pub bs_x: Option<f64>,
    pub bs_y: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TopologyProfile {
    #[serde(default)]
    pub servers: Vec<ProfileServer>,
}

impl TopologyProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ProfileRead { path: path.display().to_string(), source })?;
        serde_yaml::from_str(&text)
            .map_err(|source| ConfigError::ProfileParse { path: path.display().to_string(), source })
    }

    /// Servers ready to seed via `Store::upsert_server`, with `phi`/`rho` at their
    /// uninformative prior of 1.0 until `migrate_history` teaches better values (§4.2).
    pub fn servers(&self) -> Vec<Server> {
        self.servers
            .iter()
            .map(|s| Server {
                name: s.name.clone(),
                ip: s.ip.clone(),
                distance_tier: s.distance,
                core_count: s.core_count.max(1),
                cpu_max_mhz: s.cpu_max_mhz,
                ram_mb: s.ram_mb,
                ram_free_mb: s.ram_mb,
                disk_mb: s.disk_mb,
                disk_free_mb: s.disk_mb,
                phi: 1.0,
                rho: 1.0,
            })
            .collect()
    }

    /// Co-located base stations, for servers that named one.
    pub fn base_stations(&self) -> Vec<BaseStation> {
        self.servers
            .iter()
            .filter_map(|s| {
                let name = s.bs.clone()?;
                Some(BaseStation {
                    name,
                    bssid: String::new(),
                    password: String::new(),
                    x: s.bs_x.unwrap_or(0.0),
                    y: s.bs_y.unwrap_or(0.0),
                    server_name: Some(s.name.clone()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_servers_and_base_stations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");
        std::fs::write(
            &path,
            r#"
servers:
  - name: edge01
    ip: 10.0.99.10
    distance: 1
    bs: edge01-bs
    bs_x: 12.5
    bs_y: 4.0
  - name: cloud
    ip: 10.0.0.1
    distance: 0
"#,
        )
        .unwrap();

        let profile = TopologyProfile::load(&path).unwrap();
        let servers = profile.servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "edge01");
        assert_eq!(servers[0].phi, 1.0);

        let bts = profile.base_stations();
        assert_eq!(bts.len(), 1);
        assert_eq!(bts[0].name, "edge01-bs");
        assert_eq!(bts[0].server_name.as_deref(), Some("edge01"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = TopologyProfile::load(Path::new("/nonexistent/profile.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileRead { .. }));
    }
}
