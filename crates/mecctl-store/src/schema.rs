//! DDL for the nine tables named in spec §6, with the three foreign keys it documents.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS edge_server_info (
    name            TEXT PRIMARY KEY,
    ip              TEXT NOT NULL,
    distance_tier   INTEGER NOT NULL,
    core_count      INTEGER NOT NULL,
    cpu_max_mhz     REAL NOT NULL,
    ram_mb          REAL NOT NULL,
    ram_free_mb     REAL NOT NULL,
    disk_mb         REAL NOT NULL,
    disk_free_mb    REAL NOT NULL,
    phi             REAL NOT NULL DEFAULT 0,
    rho             REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bts_info (
    name        TEXT PRIMARY KEY,
    bssid       TEXT NOT NULL,
    password    TEXT NOT NULL DEFAULT '',
    x           REAL NOT NULL,
    y           REAL NOT NULL,
    server_id   TEXT REFERENCES edge_server_info(name)
);

CREATE TABLE IF NOT EXISTS service_info (
    name                    TEXT PRIMARY KEY,
    service_name            TEXT NOT NULL,
    user                    TEXT NOT NULL,
    image                   TEXT NOT NULL,
    server_name             TEXT NOT NULL REFERENCES edge_server_info(name),
    host_port               INTEGER NOT NULL,
    container_port          INTEGER NOT NULL,
    checkpoint_dir          TEXT NOT NULL,
    method                  TEXT NOT NULL,
    status                  TEXT NOT NULL,
    state                   TEXT NOT NULL,
    cpu_mhz                 REAL NOT NULL DEFAULT 0,
    mem_mb                  REAL NOT NULL DEFAULT 0,
    size_mb                 REAL NOT NULL DEFAULT 0,
    delta_memory_bytes      REAL NOT NULL DEFAULT 0,
    pre_checkpoint_bytes    REAL NOT NULL DEFAULT 0,
    time_xdelta_s           REAL NOT NULL DEFAULT 0,
    time_checkpoint_s       REAL NOT NULL DEFAULT 0,
    request_count           INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS end_user_info (
    name                TEXT PRIMARY KEY,
    current_bs          TEXT,
    service_id          TEXT REFERENCES service_info(name),
    online              INTEGER NOT NULL DEFAULT 1,
    x                   REAL NOT NULL DEFAULT 0,
    y                   REAL NOT NULL DEFAULT 0,
    vx                  REAL NOT NULL DEFAULT 0,
    vy                  REAL NOT NULL DEFAULT 0,
    trajectory_a        REAL NOT NULL DEFAULT 0,
    trajectory_b        REAL NOT NULL DEFAULT 0
);

-- Default per-service-name resource footprint, used for placement before a
-- monitor/container report has arrived for a freshly deployed service.
CREATE TABLE IF NOT EXISTS service_profile (
    service_name    TEXT PRIMARY KEY,
    cpu_mhz         REAL NOT NULL DEFAULT 0,
    mem_mb          REAL NOT NULL DEFAULT 0,
    size_mb         REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS migrate_history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    t               REAL NOT NULL,
    src             TEXT NOT NULL,
    dst             TEXT NOT NULL,
    service         TEXT NOT NULL,
    -- container size at migration time; not one of §3's MigrateRecord fields verbatim
    -- but required to reconstruct update_phi/update_rho's size_mb term (§4.2).
    size_mb         REAL,
    method          TEXT,
    pre_checkpoint  REAL,
    pre_rsync       REAL,
    prepare         REAL,
    checkpoint      REAL,
    rsync           REAL,
    xdelta_source   REAL,
    final_rsync     REAL,
    migrate         REAL,
    premigration    REAL,
    xdelta_dest     REAL,
    restore         REAL,
    size_pre_rsync  REAL,
    size_rsync      REAL,
    size_final_rsync REAL
);

CREATE TABLE IF NOT EXISTS network_monitor (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    t           REAL NOT NULL,
    src_server  TEXT NOT NULL,
    dst_server  TEXT NOT NULL,
    latency_us  REAL NOT NULL,
    bw_mbps     REAL NOT NULL
);

-- Append-only log of (user -> service) bindings, so a MigrationCostModel can be
-- inherited across re-registrations of the same user (§3).
CREATE TABLE IF NOT EXISTS user_service (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user        TEXT NOT NULL,
    service_id  TEXT NOT NULL,
    t           REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS rssi_monitor (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    t               REAL NOT NULL,
    user            TEXT NOT NULL,
    bs              TEXT NOT NULL,
    x               REAL,
    y               REAL,
    raw_rssi        REAL NOT NULL,
    filtered_rssi   REAL NOT NULL,
    eta2            REAL,
    eta1            REAL,
    eta0            REAL
);

-- Not one of the nine tables §6 names explicitly, but required to back
-- average_request_size/average_proc_delay (§4.2); original_source's request-sample
-- stream (parserDelay.py-equivalent) needs somewhere to land.
CREATE TABLE IF NOT EXISTS request_monitor (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    t                   REAL NOT NULL,
    user                TEXT NOT NULL,
    service             TEXT NOT NULL,
    bs                  TEXT NOT NULL,
    server              TEXT NOT NULL,
    proc_delay_ms       REAL NOT NULL,
    e2e_delay_ms        REAL NOT NULL,
    request_size_bytes  REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_request_user_t ON request_monitor(user, t DESC);
CREATE INDEX IF NOT EXISTS idx_rssi_user_bs_t ON rssi_monitor(user, bs, t DESC);
CREATE INDEX IF NOT EXISTS idx_network_pair_t ON network_monitor(src_server, dst_server, t DESC);
CREATE INDEX IF NOT EXISTS idx_migrate_service_t ON migrate_history(service, t DESC);
"#;
