//! Extension pour lire la configuration du lecteur depuis pmoconfig
//!
//! Ce module fournit le trait `PlayerConfigExt` qui construit une
//! [`SessionConfig`] à partir de `pmoconfig::Config`. La session elle-même ne
//! lit jamais la configuration : elle reçoit une valeur déjà résolue, ce qui
//! permet de la tester sans toucher au disque.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::get_config;
//! use pmoplayer::PlayerConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let session_config = config.get_session_config()?;
//! println!("Resume threshold: {}s", session_config.resume.min_seconds);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;

use crate::position::ResumePolicy;

/// Paramètres résolus d'une session de lecture
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub resume: ResumePolicy,
    /// Délai avant l'avertissement "peu de sources" d'un swarm
    pub swarm_ready_timeout: Duration,
    /// Délai avant une nouvelle tentative via proxy (flux live)
    pub live_retry_delay: Duration,
    /// Modèles d'URL de proxy, chacun contenant `{url}`
    pub live_proxies: Vec<String>,
    pub epg_ttl: Duration,
    pub initial_volume: f64,
    pub autoplay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume: ResumePolicy::default(),
            swarm_ready_timeout: Duration::from_secs(30),
            live_retry_delay: Duration::from_millis(500),
            live_proxies: vec!["https://corsproxy.io/?{url}".to_string()],
            epg_ttl: Duration::from_secs(6 * 3600),
            initial_volume: 1.0,
            autoplay: true,
        }
    }
}

/// Trait d'extension pour la configuration du lecteur
///
/// Les getters de `pmoconfig` persistent les valeurs par défaut manquantes,
/// la première lecture complète donc le fichier `config.yaml`.
pub trait PlayerConfigExt {
    /// Construit la configuration complète d'une session
    fn get_session_config(&self) -> Result<SessionConfig>;

    /// Répertoire de sauvegarde des téléchargements (créé si besoin)
    fn get_player_downloads_dir(&self) -> Result<PathBuf>;
}

impl PlayerConfigExt for Config {
    fn get_session_config(&self) -> Result<SessionConfig> {
        let finished_ratio = self.get_resume_finished_ratio()?;
        if !(0.0..=1.0).contains(&finished_ratio) {
            anyhow::bail!("player.resume.finished_ratio must be within [0, 1], got {finished_ratio}");
        }

        Ok(SessionConfig {
            resume: ResumePolicy {
                min_seconds: self.get_resume_min_seconds()?,
                finished_ratio,
                write_interval: Duration::from_secs_f64(
                    self.get_resume_write_interval_secs()?.max(0.0),
                ),
                ttl: Duration::from_secs(self.get_resume_ttl_days()? * 24 * 3600),
            },
            swarm_ready_timeout: Duration::from_secs(self.get_swarm_ready_timeout_secs()?),
            live_retry_delay: Duration::from_millis(self.get_live_retry_delay_ms()?),
            live_proxies: self.get_live_proxies()?,
            epg_ttl: Duration::from_secs(self.get_live_epg_ttl_secs()?),
            initial_volume: self.get_initial_volume()?.clamp(0.0, 1.0),
            autoplay: self.get_autoplay()?,
        })
    }

    fn get_player_downloads_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.get_downloads_dir()?))
    }
}
