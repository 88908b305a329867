use mecctl_types::model::{
    BaseStation, EndUser, MigrateMethod, MigrateRecord, PositionFix, Server, Service,
    ServiceState,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::convert::{method_from_str, method_to_str, state_from_str, state_to_str};
use crate::ema::ema;
use crate::error::{Result, StoreError};
use crate::schema::SCHEMA;
use crate::trilateration::{trilaterate, BsObservation};
use crate::{regression, trilateration};

/// Sentinel values for windowed averages with no samples (§4.2: "very bad").
pub const SENTINEL_BW_MBPS: f64 = 0.001; // 1 kbps
pub const SENTINEL_RTT_SECONDS: f64 = 10.0;
pub const CORRELATION_WINDOW_SECONDS: f64 = 60.0;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ---- Servers --------------------------------------------------------------

    pub fn upsert_server(&self, server: &Server) -> Result<()> {
        self.conn.execute(
            "INSERT INTO edge_server_info
                (name, ip, distance_tier, core_count, cpu_max_mhz, ram_mb, ram_free_mb, disk_mb, disk_free_mb, phi, rho)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT(name) DO UPDATE SET
                ip=excluded.ip, distance_tier=excluded.distance_tier, core_count=excluded.core_count,
                cpu_max_mhz=excluded.cpu_max_mhz, ram_mb=excluded.ram_mb, ram_free_mb=excluded.ram_free_mb,
                disk_mb=excluded.disk_mb, disk_free_mb=excluded.disk_free_mb,
                phi=excluded.phi, rho=excluded.rho",
            params![
                server.name, server.ip, server.distance_tier, server.core_count,
                server.cpu_max_mhz, server.ram_mb, server.ram_free_mb, server.disk_mb,
                server.disk_free_mb, server.phi, server.rho,
            ],
        )?;
        Ok(())
    }

    fn row_to_server(row: &Row) -> rusqlite::Result<Server> {
        Ok(Server {
            name: row.get("name")?,
            ip: row.get("ip")?,
            distance_tier: row.get("distance_tier")?,
            core_count: row.get("core_count")?,
            cpu_max_mhz: row.get("cpu_max_mhz")?,
            ram_mb: row.get("ram_mb")?,
            ram_free_mb: row.get("ram_free_mb")?,
            disk_mb: row.get("disk_mb")?,
            disk_free_mb: row.get("disk_free_mb")?,
            phi: row.get("phi")?,
            rho: row.get("rho")?,
        })
    }

    pub fn server_by_name(&self, name: &str) -> Result<Option<Server>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM edge_server_info WHERE name = ?1",
                params![name],
                Self::row_to_server,
            )
            .optional()?)
    }

    pub fn server_by_ip(&self, ip: &str) -> Result<Option<Server>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM edge_server_info WHERE ip = ?1",
                params![ip],
                Self::row_to_server,
            )
            .optional()?)
    }

    pub fn all_servers(&self) -> Result<Vec<Server>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM edge_server_info ORDER BY distance_tier, name")?;
        let rows = stmt
            .query_map([], Self::row_to_server)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_server(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM edge_server_info WHERE name = ?1", params![name])?;
        Ok(())
    }

    // ---- Base stations ----------------------------------------------------------

    pub fn upsert_bts(&self, bts: &BaseStation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO bts_info (name, bssid, password, x, y, server_id)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(name) DO UPDATE SET
                bssid=excluded.bssid, password=excluded.password, x=excluded.x, y=excluded.y,
                server_id=excluded.server_id",
            params![bts.name, bts.bssid, bts.password, bts.x, bts.y, bts.server_name],
        )?;
        Ok(())
    }

    fn row_to_bts(row: &Row) -> rusqlite::Result<BaseStation> {
        Ok(BaseStation {
            name: row.get("name")?,
            bssid: row.get("bssid")?,
            password: row.get("password")?,
            x: row.get("x")?,
            y: row.get("y")?,
            server_name: row.get("server_id")?,
        })
    }

    pub fn bts_by_name(&self, name: &str) -> Result<Option<BaseStation>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM bts_info WHERE name = ?1",
                params![name],
                Self::row_to_bts,
            )
            .optional()?)
    }

    pub fn all_bts(&self) -> Result<Vec<BaseStation>> {
        let mut stmt = self.conn.prepare("SELECT * FROM bts_info ORDER BY name")?;
        Ok(stmt
            .query_map([], Self::row_to_bts)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- End users ----------------------------------------------------------------

    pub fn upsert_user(&self, user: &EndUser) -> Result<()> {
        let ring_json = serde_json::to_string(&user.recent_positions).unwrap_or_default();
        self.conn.execute(
            "INSERT INTO end_user_info
                (name, current_bs, service_id, online, x, y, vx, vy, trajectory_a, trajectory_b, recent_positions)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT(name) DO UPDATE SET
                current_bs=excluded.current_bs, service_id=excluded.service_id, online=excluded.online,
                x=excluded.x, y=excluded.y, vx=excluded.vx, vy=excluded.vy,
                trajectory_a=excluded.trajectory_a, trajectory_b=excluded.trajectory_b,
                recent_positions=excluded.recent_positions",
            params![
                user.name, user.current_bs, user.current_service_id, user.online,
                user.x, user.y, user.vx, user.vy, user.trajectory_a, user.trajectory_b, ring_json,
            ],
        )?;
        Ok(())
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<EndUser> {
        let ring_json: Option<String> = row.get("recent_positions")?;
        let recent_positions = ring_json
            .and_then(|s| serde_json::from_str::<Vec<PositionFix>>(&s).ok())
            .unwrap_or_default();
        Ok(EndUser {
            name: row.get("name")?,
            current_bs: row.get("current_bs")?,
            current_service_id: row.get("service_id")?,
            online: row.get("online")?,
            x: row.get("x")?,
            y: row.get("y")?,
            vx: row.get("vx")?,
            vy: row.get("vy")?,
            trajectory_a: row.get("trajectory_a")?,
            trajectory_b: row.get("trajectory_b")?,
            recent_positions,
        })
    }

    pub fn user_by_name(&self, name: &str) -> Result<Option<EndUser>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM end_user_info WHERE name = ?1",
                params![name],
                Self::row_to_user,
            )
            .optional()?)
    }

    pub fn delete_user(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM end_user_info WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Trilaterates from the three strongest observations, updates the user's
    /// position, pushes the last-5 ring, and refits the trajectory (§4.2).
    pub fn fix_user_position(
        &self,
        user: &str,
        t: f64,
        obs: [BsObservation; 3],
    ) -> Result<Option<(f64, f64)>> {
        let Some((x, y)) = trilaterate(obs) else {
            return Ok(None);
        };
        let mut u = self
            .user_by_name(user)?
            .ok_or_else(|| StoreError::NotFound { kind: "end_user", id: user.to_string() })?;
        u.x = x;
        u.y = y;
        regression::push_position_ring(&mut u.recent_positions, PositionFix { t, x, y });
        let (a, b) = regression::fit_trajectory(&u.recent_positions);
        u.trajectory_a = a;
        u.trajectory_b = b;
        let (vx, vy) = regression::finite_difference_velocity(&u.recent_positions);
        u.vx = vx;
        u.vy = vy;
        self.upsert_user(&u)?;
        Ok(Some((x, y)))
    }

    // ---- Services -------------------------------------------------------------

    pub fn upsert_service(&self, service: &Service) -> Result<()> {
        self.conn.execute(
            "INSERT INTO service_info
                (name, service_name, user, image, server_name, host_port, container_port,
                 checkpoint_dir, method, status, state, cpu_mhz, mem_mb, size_mb,
                 delta_memory_bytes, pre_checkpoint_bytes, time_xdelta_s, time_checkpoint_s, request_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)
             ON CONFLICT(name) DO UPDATE SET
                server_name=excluded.server_name, host_port=excluded.host_port,
                container_port=excluded.container_port, checkpoint_dir=excluded.checkpoint_dir,
                method=excluded.method, status=excluded.status, state=excluded.state,
                cpu_mhz=excluded.cpu_mhz, mem_mb=excluded.mem_mb, size_mb=excluded.size_mb,
                delta_memory_bytes=excluded.delta_memory_bytes,
                pre_checkpoint_bytes=excluded.pre_checkpoint_bytes,
                time_xdelta_s=excluded.time_xdelta_s, time_checkpoint_s=excluded.time_checkpoint_s,
                request_count=excluded.request_count",
            params![
                service.id, service.service_name, service.user, service.image, service.server,
                service.host_port, service.container_port, service.checkpoint_dir,
                method_to_str(service.method), service.status, state_to_str(service.state),
                service.cpu_mhz, service.mem_mb, service.size_mb, service.delta_memory_bytes,
                service.pre_checkpoint_bytes, service.time_xdelta_s, service.time_checkpoint_s,
                service.request_count,
            ],
        )?;
        Ok(())
    }

    fn row_to_service(row: &Row) -> rusqlite::Result<Service> {
        let method_str: String = row.get("method")?;
        let state_str: String = row.get("state")?;
        Ok(Service {
            id: row.get("name")?,
            service_name: row.get("service_name")?,
            user: row.get("user")?,
            image: row.get("image")?,
            server: row.get("server_name")?,
            host_port: row.get("host_port")?,
            container_port: row.get("container_port")?,
            checkpoint_dir: row.get("checkpoint_dir")?,
            method: method_from_str(&method_str),
            status: row.get("status")?,
            state: state_from_str(&state_str),
            cpu_mhz: row.get("cpu_mhz")?,
            mem_mb: row.get("mem_mb")?,
            size_mb: row.get("size_mb")?,
            delta_memory_bytes: row.get("delta_memory_bytes")?,
            pre_checkpoint_bytes: row.get("pre_checkpoint_bytes")?,
            time_xdelta_s: row.get("time_xdelta_s")?,
            time_checkpoint_s: row.get("time_checkpoint_s")?,
            request_count: row.get("request_count")?,
        })
    }

    pub fn service_by_id(&self, id: &str) -> Result<Option<Service>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM service_info WHERE name = ?1",
                params![id],
                Self::row_to_service,
            )
            .optional()?)
    }

    pub fn service_for_user(&self, user: &str) -> Result<Option<Service>> {
        Ok(self
            .conn
            .query_row(
                "SELECT s.* FROM service_info s
                 JOIN end_user_info u ON u.service_id = s.name
                 WHERE u.name = ?1",
                params![user],
                Self::row_to_service,
            )
            .optional()?)
    }

    pub fn services_on_server(&self, server: &str) -> Result<Vec<Service>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM service_info WHERE server_name = ?1")?;
        Ok(stmt
            .query_map(params![server], Self::row_to_service)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Deletes the service and clears the owning user's binding (invariant 1).
    pub fn delete_service(&self, id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE end_user_info SET service_id = NULL WHERE service_id = ?1",
            params![id],
        )?;
        self.conn
            .execute("DELETE FROM service_info WHERE name = ?1", params![id])?;
        Ok(())
    }

    pub fn record_user_service_binding(&self, user: &str, service_id: &str, t: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_service (user, service_id, t) VALUES (?1,?2,?3)",
            params![user, service_id, t],
        )?;
        Ok(())
    }

    // ---- Service profile (defaults used before the first container report) -------

    pub fn upsert_service_profile(
        &self,
        service_name: &str,
        cpu_mhz: f64,
        mem_mb: f64,
        size_mb: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO service_profile (service_name, cpu_mhz, mem_mb, size_mb)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(service_name) DO UPDATE SET
                cpu_mhz=excluded.cpu_mhz, mem_mb=excluded.mem_mb, size_mb=excluded.size_mb",
            params![service_name, cpu_mhz, mem_mb, size_mb],
        )?;
        Ok(())
    }

    pub fn service_profile(&self, service_name: &str) -> Result<Option<(f64, f64, f64)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT cpu_mhz, mem_mb, size_mb FROM service_profile WHERE service_name = ?1",
                params![service_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?)
    }

    // ---- RSSI -------------------------------------------------------------------

    /// Inserts a new raw RSSI sample, applying the EMA filter against the most recent
    /// filtered value for this (user, bs) pair (§4.2). Returns the filtered value.
    pub fn insert_rssi_sample(
        &self,
        user: &str,
        bs: &str,
        t: f64,
        x: Option<f64>,
        y: Option<f64>,
        raw_rssi: f64,
    ) -> Result<f64> {
        let previous: Option<f64> = self
            .conn
            .query_row(
                "SELECT filtered_rssi FROM rssi_monitor WHERE user = ?1 AND bs = ?2
                 ORDER BY t DESC LIMIT 1",
                params![user, bs],
                |row| row.get(0),
            )
            .optional()?;
        let filtered = ema(raw_rssi, previous);
        self.conn.execute(
            "INSERT INTO rssi_monitor (t, user, bs, x, y, raw_rssi, filtered_rssi)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![t, user, bs, x, y, raw_rssi, filtered],
        )?;
        Ok(filtered)
    }

    /// Up to the last `n` (t, filtered_rssi) samples for (user, bs), oldest first.
    pub fn recent_filtered_rssi(&self, user: &str, bs: &str, n: u32) -> Result<Vec<(f64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t, filtered_rssi FROM rssi_monitor WHERE user = ?1 AND bs = ?2
             ORDER BY t DESC LIMIT ?3",
        )?;
        let mut rows = stmt
            .query_map(params![user, bs, n], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(f64, f64)>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// The most recently observed filtered RSSI per BS for `user`, restricted to
    /// observations within `lookback_s` of `now` (§4.3 "within the last 5 minutes"),
    /// sorted strongest-first.
    pub fn recent_bs_observations(
        &self,
        user: &str,
        now: f64,
        lookback_s: f64,
    ) -> Result<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT bs, filtered_rssi FROM rssi_monitor r
             WHERE user = ?1 AND t >= ?2
             AND t = (SELECT MAX(t) FROM rssi_monitor r2 WHERE r2.user = r.user AND r2.bs = r.bs)
             ORDER BY filtered_rssi DESC",
        )?;
        let rows = stmt
            .query_map(params![user, now - lookback_s], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(String, f64)>>>()?;
        Ok(rows)
    }

    // ---- Network samples ----------------------------------------------------------

    pub fn insert_network_sample(
        &self,
        src: &str,
        dst: &str,
        t: f64,
        latency_us: f64,
        bw_mbps: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO network_monitor (t, src_server, dst_server, latency_us, bw_mbps)
             VALUES (?1,?2,?3,?4,?5)",
            params![t, src, dst, latency_us, bw_mbps],
        )?;
        Ok(())
    }

    /// Mean bandwidth over the most recent `window` samples for `(src,dst)`; the
    /// "very bad" sentinel (§4.2) if none exist.
    pub fn average_bw(&self, src: &str, dst: &str, window: u32) -> Result<f64> {
        if src == dst {
            return Ok(f64::INFINITY);
        }
        let values = self.recent_network_column(src, dst, window, "bw_mbps")?;
        Ok(if values.is_empty() {
            SENTINEL_BW_MBPS
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        })
    }

    /// Mean RTT (seconds) over the most recent `window` samples; `latency_us` is
    /// stored one-way, RTT is double it. The "very bad" sentinel otherwise.
    pub fn average_rtt(&self, src: &str, dst: &str, window: u32) -> Result<f64> {
        if src == dst {
            return Ok(0.0);
        }
        let values = self.recent_network_column(src, dst, window, "latency_us")?;
        Ok(if values.is_empty() {
            SENTINEL_RTT_SECONDS
        } else {
            2.0 * (values.iter().sum::<f64>() / values.len() as f64) / 1_000_000.0
        })
    }

    fn recent_network_column(
        &self,
        src: &str,
        dst: &str,
        window: u32,
        column: &str,
    ) -> Result<Vec<f64>> {
        let sql = format!(
            "SELECT {column} FROM network_monitor WHERE src_server = ?1 AND dst_server = ?2
             ORDER BY t DESC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt
            .query_map(params![src, dst, window], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?)
    }

    /// §4.2: if `bts`'s associated server is `server`, the link is "effectively
    /// unbounded" (open question (a)); otherwise delegate to the server-to-server
    /// average.
    pub fn bts_to_edge_bw_rtt(&self, bts: &str, server: &str, window: u32) -> Result<(f64, f64)> {
        let bts_server = self.bts_by_name(bts)?.and_then(|b| b.server_name).unwrap_or_default();
        if bts_server == server {
            return Ok((f64::INFINITY, 0.0));
        }
        Ok((
            self.average_bw(&bts_server, server, window)?,
            self.average_rtt(&bts_server, server, window)?,
        ))
    }

    // ---- Request samples ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_request_sample(
        &self,
        user: &str,
        service: &str,
        bs: &str,
        server: &str,
        t: f64,
        proc_delay_ms: f64,
        e2e_delay_ms: f64,
        request_size_bytes: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO request_monitor
                (t, user, service, bs, server, proc_delay_ms, e2e_delay_ms, request_size_bytes)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![t, user, service, bs, server, proc_delay_ms, e2e_delay_ms, request_size_bytes],
        )?;
        Ok(())
    }

    pub fn average_request_size(&self, user: &str, window: u32) -> Result<f64> {
        let mut stmt = self.conn.prepare(
            "SELECT request_size_bytes FROM request_monitor WHERE user = ?1
             ORDER BY t DESC LIMIT ?2",
        )?;
        let values = stmt
            .query_map(params![user, window], |row| row.get::<_, f64>(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
        Ok(if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        })
    }

    pub fn average_proc_delay(
        &self,
        user: &str,
        bs: &str,
        server: &str,
        window: u32,
    ) -> Result<f64> {
        let mut stmt = self.conn.prepare(
            "SELECT proc_delay_ms FROM request_monitor
             WHERE user = ?1 AND bs = ?2 AND server = ?3
             ORDER BY t DESC LIMIT ?4",
        )?;
        let values = stmt
            .query_map(params![user, bs, server, window], |row| {
                row.get::<_, f64>(0)
            })?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
        Ok(if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        })
    }

    // ---- Migration history ----------------------------------------------------------

    pub fn insert_migrate_record(&self, record: &MigrateRecord, size_mb: Option<f64>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO migrate_history
                (t, src, dst, service, size_mb, method, pre_checkpoint, pre_rsync, prepare,
                 checkpoint, rsync, xdelta_source, final_rsync, migrate, premigration,
                 xdelta_dest, restore, size_pre_rsync, size_rsync, size_final_rsync)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                record.t, record.src, record.dst, record.service, size_mb,
                record.method.map(method_to_str),
                record.pre_checkpoint, record.pre_rsync, record.prepare, record.checkpoint,
                record.rsync, record.xdelta_source, record.final_rsync, record.migrate,
                record.premigration, record.xdelta_dest, record.restore,
                record.size_pre_rsync, record.size_rsync, record.size_final_rsync,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_migrate_record(row: &Row) -> rusqlite::Result<MigrateRecord> {
        let method_str: Option<String> = row.get("method")?;
        Ok(MigrateRecord {
            t: row.get("t")?,
            src: row.get("src")?,
            dst: row.get("dst")?,
            service: row.get("service")?,
            method: method_str.as_deref().map(method_from_str),
            pre_checkpoint: row.get("pre_checkpoint")?,
            pre_rsync: row.get("pre_rsync")?,
            prepare: row.get("prepare")?,
            checkpoint: row.get("checkpoint")?,
            rsync: row.get("rsync")?,
            xdelta_source: row.get("xdelta_source")?,
            final_rsync: row.get("final_rsync")?,
            migrate: row.get("migrate")?,
            premigration: row.get("premigration")?,
            xdelta_dest: row.get("xdelta_dest")?,
            restore: row.get("restore")?,
            size_pre_rsync: row.get("size_pre_rsync")?,
            size_rsync: row.get("size_rsync")?,
            size_final_rsync: row.get("size_final_rsync")?,
        })
    }

    /// Completes the newest uncompleted record matching `(service, dst=dest_server)`
    /// within the 60-second correlation window (invariant 4, §5 "cancellation").
    /// Unmatched reports are dropped (open question (d)).
    pub fn complete_migrate_record(
        &self,
        dest_server: &str,
        service: &str,
        now: f64,
        premigration: Option<f64>,
        xdelta_dest: Option<f64>,
        restore: Option<f64>,
    ) -> Result<bool> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM migrate_history
                 WHERE dst = ?1 AND service = ?2 AND restore IS NULL AND t >= ?3
                 ORDER BY t DESC LIMIT 1",
                params![dest_server, service, now - CORRELATION_WINDOW_SECONDS],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else { return Ok(false) };
        self.conn.execute(
            "UPDATE migrate_history SET premigration = ?1, xdelta_dest = ?2, restore = ?3 WHERE id = ?4",
            params![premigration, xdelta_dest, restore, id],
        )?;
        Ok(true)
    }

    /// `phi = mean(max_cpu * cores * checkpoint_time / size_mb)` over up to the last
    /// 20 `MigrateRecord`s whose `src` is `server` (§4.2). Persists and returns it.
    pub fn update_phi(&self, server: &str) -> Result<Option<f64>> {
        let Some(srv) = self.server_by_name(server)? else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT checkpoint, size_mb FROM migrate_history
             WHERE src = ?1 AND checkpoint IS NOT NULL AND size_mb IS NOT NULL
             ORDER BY t DESC LIMIT 20",
        )?;
        let samples = stmt
            .query_map(params![server], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<(f64, f64)>>>()?;
        if samples.is_empty() {
            return Ok(None);
        }
        let cap = srv.cpu_max_mhz * srv.core_count as f64;
        let phi = samples
            .iter()
            .filter(|(_, size)| *size > 0.0)
            .map(|(checkpoint, size)| cap * checkpoint / size)
            .sum::<f64>()
            / samples.len() as f64;
        self.conn.execute(
            "UPDATE edge_server_info SET phi = ?1 WHERE name = ?2",
            params![phi, server],
        )?;
        Ok(Some(phi))
    }

    /// `rho = mean(max_cpu * cores * restore_time / (size_mb + (rsync+pre_rsync+final_rsync)/1e6))`
    /// over up to the last 20 records whose `src` is `server` (§4.2).
    pub fn update_rho(&self, server: &str) -> Result<Option<f64>> {
        let Some(srv) = self.server_by_name(server)? else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT restore, size_mb, size_pre_rsync, size_rsync, size_final_rsync
             FROM migrate_history
             WHERE dst = ?1 AND restore IS NOT NULL AND size_mb IS NOT NULL
             ORDER BY t DESC LIMIT 20",
        )?;
        let samples = stmt
            .query_map(params![server], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                ))
            })?
            .collect::<rusqlite::Result<Vec<(f64, f64, f64, f64, f64)>>>()?;
        if samples.is_empty() {
            return Ok(None);
        }
        let cap = srv.cpu_max_mhz * srv.core_count as f64;
        let rho = samples
            .iter()
            .map(|(restore, size, pre_rsync, rsync, final_rsync)| {
                let denom = size + (pre_rsync + rsync + final_rsync) / 1_000_000.0;
                if denom > 0.0 {
                    cap * restore / denom
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / samples.len() as f64;
        self.conn.execute(
            "UPDATE edge_server_info SET rho = ?1 WHERE name = ?2",
            params![rho, server],
        )?;
        Ok(Some(rho))
    }
}

/// Handy distance-to-RSSI re-export for callers that already depend on the store for
/// the path-loss constants.
pub use trilateration::rssi_to_distance;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_server(name: &str, tier: u32) -> Server {
        Server {
            name: name.to_string(),
            ip: format!("10.0.99.{tier}"),
            distance_tier: tier,
            core_count: 4,
            cpu_max_mhz: 2400.0,
            ram_mb: 8192.0,
            ram_free_mb: 4096.0,
            disk_mb: 100_000.0,
            disk_free_mb: 50_000.0,
            phi: 0.0,
            rho: 0.0,
        }
    }

    #[test]
    fn register_and_lookup_server() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_server(&sample_server("edge01", 1)).unwrap();
        let got = store.server_by_name("edge01").unwrap().unwrap();
        assert_eq!(got.ip, "10.0.99.1");
        let by_ip = store.server_by_ip("10.0.99.1").unwrap().unwrap();
        assert_eq!(by_ip.name, "edge01");
    }

    #[test]
    fn deleting_a_service_clears_the_user_binding() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_server(&sample_server("edge01", 1)).unwrap();
        let mut user = EndUser::new("U1");
        let svc = Service {
            id: Service::make_id("openface", "U1"),
            service_name: "openface".into(),
            user: "U1".into(),
            image: "img".into(),
            server: "edge01".into(),
            host_port: 8080,
            container_port: 80,
            checkpoint_dir: "/tmp".into(),
            method: MigrateMethod::PreCopy,
            status: "running".into(),
            state: ServiceState::Running,
            cpu_mhz: 100.0,
            mem_mb: 256.0,
            size_mb: 500.0,
            delta_memory_bytes: 0.0,
            pre_checkpoint_bytes: 0.0,
            time_xdelta_s: 0.0,
            time_checkpoint_s: 0.0,
            request_count: 0,
        };
        store.upsert_service(&svc).unwrap();
        user.current_service_id = Some(svc.id.clone());
        store.upsert_user(&user).unwrap();

        store.delete_service(&svc.id).unwrap();
        assert!(store.service_by_id(&svc.id).unwrap().is_none());
        let reloaded = store.user_by_name("U1").unwrap().unwrap();
        assert_eq!(reloaded.current_service_id, None);
    }

    #[test]
    fn average_bw_sentinel_with_no_samples() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.average_bw("a", "b", 10).unwrap(), SENTINEL_BW_MBPS);
        assert_eq!(store.average_rtt("a", "b", 10).unwrap(), SENTINEL_RTT_SECONDS);
    }

    #[test]
    fn average_bw_same_server_is_unbounded() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.average_bw("a", "a", 10).unwrap(), f64::INFINITY);
    }

    #[test]
    fn average_bw_windows_correctly() {
        let store = Store::open_in_memory().unwrap();
        for (t, bw) in [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0), (4.0, 40.0)] {
            store.insert_network_sample("a", "b", t, 1000.0, bw).unwrap();
        }
        // window=2 -> most recent two samples: 30, 40 -> avg 35
        let avg = store.average_bw("a", "b", 2).unwrap();
        assert!((avg - 35.0).abs() < 1e-9);
    }

    #[test]
    fn migrate_record_completion_respects_correlation_window() {
        let store = Store::open_in_memory().unwrap();
        let record = MigrateRecord {
            t: 100.0,
            src: "edge01".into(),
            dst: "edge02".into(),
            service: "openface\u{2225}U1".into(),
            ..Default::default()
        };
        store.insert_migrate_record(&record, Some(500.0)).unwrap();

        // Within window (now - t = 30s < 60s): completes.
        let ok = store
            .complete_migrate_record("edge02", "openface\u{2225}U1", 130.0, Some(1.0), Some(2.0), Some(3.0))
            .unwrap();
        assert!(ok);
        let stored = store.service_by_id("nonexistent").unwrap();
        assert!(stored.is_none());
    }

    #[test]
    fn migrate_record_completion_drops_stale_reports() {
        let store = Store::open_in_memory().unwrap();
        let record = MigrateRecord {
            t: 0.0,
            src: "edge01".into(),
            dst: "edge02".into(),
            service: "openface\u{2225}U1".into(),
            ..Default::default()
        };
        store.insert_migrate_record(&record, Some(500.0)).unwrap();

        // now - t = 90s > 60s window: must not match.
        let ok = store
            .complete_migrate_record("edge02", "openface\u{2225}U1", 90.0, None, None, Some(1.0))
            .unwrap();
        assert!(!ok);
    }
}
