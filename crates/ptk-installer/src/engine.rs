//! Installer engine facade.
//!
//! [`Installer`] owns the resolved paths and every collaborator, and exposes
//! the user-facing operations. Each mutating operation runs through the
//! [`OperationRunner`], so only one is ever in flight and its log lines are
//! bracketed. Blocking filesystem and signature work runs on the blocking
//! thread pool.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::InstallerConfig;
use crate::driver::{DriverPair, DriverSnapshot, DriverStatus};
use crate::error::InstallerError;
use crate::locator::{InstallerContext, PathLocator};
use crate::operation::{EngineState, LogSink, OperationRunner};
use crate::release::{GitHubReleases, ReleaseHost};
use crate::settings::SettingsPatcher;
use crate::signature::{self, SignatureVerifier};
use crate::update::{UpdateChecker, UpdateReport, TOOLKIT_NAME};

const APP_NAME: &str = "PSVR2 App";

/// Run blocking work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, InstallerError>
where
    F: FnOnce() -> Result<T, InstallerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| InstallerError::Io(std::io::Error::other(e)))?
}

/// The driver-state reconciliation engine.
pub struct Installer {
    context: InstallerContext,
    config: InstallerConfig,
    pair: Arc<DriverPair>,
    settings: Arc<SettingsPatcher>,
    host: Arc<dyn ReleaseHost>,
    updates: UpdateChecker,
    runner: OperationRunner,
    state: Arc<watch::Sender<EngineState>>,
}

impl Installer {
    /// Assemble an engine from explicit collaborators.
    pub fn new(
        context: InstallerContext,
        config: InstallerConfig,
        verifier: Arc<dyn SignatureVerifier>,
        host: Arc<dyn ReleaseHost>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::default());
        let state = Arc::new(state);

        Self {
            pair: Arc::new(DriverPair::new(
                context.current_driver.clone(),
                context.original_driver.clone(),
                verifier,
            )),
            settings: Arc::new(SettingsPatcher::new(
                context.settings_path.clone(),
                &config.settings,
            )),
            updates: UpdateChecker::new(Arc::clone(&host), &config),
            runner: OperationRunner::new(sink, Arc::clone(&state)),
            host,
            state,
            context,
            config,
        }
    }

    /// Resolve Steam paths and build the native engine.
    ///
    /// Uses the platform signature verifier and the GitHub release host.
    pub async fn from_config(config: InstallerConfig, sink: Arc<dyn LogSink>) -> Result<Self, InstallerError> {
        let locator_config = config.clone();
        let context = blocking(move || {
            PathLocator::from_config(&locator_config).resolve_context(&locator_config)
        })
        .await?;

        let mut host = GitHubReleases::new(&config.network, &config.releases)?;
        host.downloader_mut()
            .set_progress_callback(|progress| trace!(%progress, "Download progress"));
        let verifier: Arc<dyn SignatureVerifier> = Arc::from(signature::native_verifier());

        let installer = Self::new(context, config, verifier, Arc::new(host), sink);
        installer.refresh().await?;
        Ok(installer)
    }

    pub fn context(&self) -> &InstallerContext {
        &self.context
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Subscribe to busy/status changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.runner.is_busy()
    }

    /// Re-derive the driver status from disk and publish it.
    pub async fn refresh(&self) -> Result<DriverStatus, InstallerError> {
        let pair = Arc::clone(&self.pair);
        let status = blocking(move || pair.validate()).await?;
        self.state.send_modify(|s| s.driver_status = Some(status));
        debug!(%status, "Published driver status");
        Ok(status)
    }

    /// Status plus file presence.
    pub async fn snapshot(&self) -> Result<DriverSnapshot, InstallerError> {
        let pair = Arc::clone(&self.pair);
        let snapshot = blocking(move || pair.snapshot()).await?;
        self.state.send_modify(|s| s.driver_status = Some(snapshot.status));
        Ok(snapshot)
    }

    /// Re-validate after a mutation that actually ran. A `Busy` rejection
    /// must not touch the driver pair while another operation owns it.
    async fn publish_after_mutation<T>(
        &self,
        result: Result<T, InstallerError>,
    ) -> Result<T, InstallerError> {
        if matches!(result, Err(InstallerError::Busy)) {
            return result;
        }
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Could not re-validate driver files");
            self.state.send_modify(|s| s.driver_status = None);
        }
        result
    }

    /// Replace the vendor driver with the latest Toolkit driver.
    ///
    /// Already being installed is reported as a warning and succeeds.
    pub async fn install(&self) -> Result<DriverStatus, InstallerError> {
        let verb = format!("{} installation", TOOLKIT_NAME);
        let result = self
            .runner
            .run(&verb, |progress| async move {
                let pair = Arc::clone(&self.pair);
                match blocking(move || pair.ensure_installable()).await {
                    Ok(()) => {}
                    Err(InstallerError::AlreadyInstalled) => {
                        progress.warning(format!("The {} is already installed.", TOOLKIT_NAME));
                        return Ok(DriverStatus::Installed);
                    }
                    Err(e) => return Err(e),
                }

                progress.info(format!("Downloading the latest {} release...", TOOLKIT_NAME));
                let bytes = self.host.fetch_bytes(&self.config.driver.download_url).await?;

                let pair = Arc::clone(&self.pair);
                blocking(move || pair.install(&bytes, &progress)).await
            })
            .await;

        self.publish_after_mutation(result).await
    }

    /// Restore the vendor driver.
    pub async fn uninstall(&self) -> Result<DriverStatus, InstallerError> {
        let verb = format!("{} uninstallation", TOOLKIT_NAME);
        let result = self
            .runner
            .run(&verb, |progress| async move {
                let pair = Arc::clone(&self.pair);
                let step = progress.clone();
                let status = blocking(move || pair.uninstall(&step)).await?;
                progress.emphasis(format!(
                    "It is recommended to verify {} files through Steam.",
                    APP_NAME
                ));
                Ok(status)
            })
            .await;

        self.publish_after_mutation(result).await
    }

    /// Download the latest Toolkit driver over the installed one.
    pub async fn reinstall(&self) -> Result<DriverStatus, InstallerError> {
        let verb = format!("{} update", TOOLKIT_NAME);
        let result = self
            .runner
            .run(&verb, |progress| async move {
                let pair = Arc::clone(&self.pair);
                blocking(move || pair.ensure_reinstallable()).await?;

                progress.info(format!("Downloading the latest {} release...", TOOLKIT_NAME));
                let bytes = self.host.fetch_bytes(&self.config.driver.download_url).await?;

                let pair = Arc::clone(&self.pair);
                blocking(move || pair.reinstall(&bytes, &progress)).await
            })
            .await;

        self.publish_after_mutation(result).await
    }

    /// Compare local artifacts with the latest releases.
    pub async fn check_for_updates(&self) -> Result<UpdateReport, InstallerError> {
        self.runner
            .run("Update check", |progress| async move {
                progress.info(format!("Fetching the latest {} release...", TOOLKIT_NAME));
                let toolkit = self.updates.latest_toolkit().await?;

                let local_digest = if self.updates.publishes_driver_digest(&toolkit) {
                    let pair = Arc::clone(&self.pair);
                    blocking(move || {
                        if pair.current_path().exists() {
                            pair.digest().map(Some)
                        } else {
                            Ok(None)
                        }
                    })
                    .await?
                } else {
                    progress.warning(format!(
                        "The latest {} release publishes no driver digest.",
                        TOOLKIT_NAME
                    ));
                    None
                };

                progress.info("Fetching the latest installer release...");
                let installer = self.updates.latest_installer().await?;

                let report = self.updates.report(&toolkit, local_digest.as_deref(), &installer);
                for artifact in [&report.toolkit, &report.installer] {
                    let verdict = match artifact.has_update {
                        Some(true) => "update available",
                        Some(false) => "up to date",
                        None => "unknown",
                    };
                    progress.info(format!("{} {}: {}", artifact.name, artifact.tag, verdict));
                }
                Ok(report)
            })
            .await
    }

    /// Whether eyelid estimation is enabled in SteamVR settings.
    pub async fn eyelid_estimation_enabled(&self) -> Result<bool, InstallerError> {
        let settings = Arc::clone(&self.settings);
        blocking(move || settings.read_flag()).await
    }

    /// Enable or disable eyelid estimation.
    ///
    /// Returns whether the settings file was rewritten.
    pub async fn set_eyelid_estimation(&self, enabled: bool) -> Result<bool, InstallerError> {
        self.runner
            .run("Toggling eyelid estimation", |progress| async move {
                let settings = Arc::clone(&self.settings);
                blocking(move || settings.write_flag(enabled, &progress)).await
            })
            .await
    }
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("context", &self.context)
            .field("pair", &self.pair)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
