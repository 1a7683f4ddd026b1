//! Configuration for the well-known transport and storage paths.

use std::{path::PathBuf, sync::OnceLock};

use figment::{
   Figment,
   providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration loaded from defaults and environment variables.
///
/// Every field can be overridden with a `DOCDEX_`-prefixed environment
/// variable (e.g. `DOCDEX_STORE_FILE`). The defaults reproduce the paths the
/// existing clients and on-disk artefacts expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   /// Well-known FIFO every client sends requests to.
   pub request_fifo: PathBuf,

   /// Directory holding the per-client `client_<pid>.fifo` reply endpoints.
   pub reply_dir: PathBuf,

   /// Fixed-record index file.
   pub store_file: PathBuf,

   /// Cache persistence image written at shutdown.
   pub cache_file: PathBuf,

   /// Scan-worker clamp: at most this many workers per CPU.
   pub scan_workers_per_cpu: u32,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         request_fifo: PathBuf::from("/tmp/server.fifo"),
         reply_dir: PathBuf::from("/tmp"),
         store_file: PathBuf::from("tmp/index.bin"),
         cache_file: PathBuf::from("tmp/cache_lru.bin"),
         scan_workers_per_cpu: 10,
      }
   }
}

fn load() -> Config {
   Figment::from(Serialized::defaults(Config::default()))
      .merge(Env::prefixed("DOCDEX_"))
      .extract()
      .unwrap_or_else(|e| {
         tracing::warn!("invalid configuration, falling back to defaults: {e}");
         Config::default()
      })
}

/// Returns the process-wide configuration, loading it on first use.
pub fn get() -> &'static Config {
   CONFIG.get_or_init(load)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn defaults_match_wire_contract_paths() {
      let cfg = Config::default();
      assert_eq!(cfg.request_fifo, PathBuf::from("/tmp/server.fifo"));
      assert_eq!(cfg.store_file, PathBuf::from("tmp/index.bin"));
      assert_eq!(cfg.cache_file, PathBuf::from("tmp/cache_lru.bin"));
      assert_eq!(cfg.scan_workers_per_cpu, 10);
   }
}
