//! Application state management for letschat.
//!
//! This module contains the core `App` struct that manages all application
//! state: the start screen form, the chat screen, the sync cache manager,
//! connectivity tracking, the anonymous session and background task
//! coordination.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use letschat_core::auth::{AuthClient, BearerToken, Session, SessionData};
use letschat_core::cache::{FileStore, LocalStore};
use letschat_core::config::probe_addr_from_env;
use letschat_core::connectivity::{ConnectivityMonitor, DEFAULT_PROBE_INTERVAL};
use letschat_core::media::MediaUploader;
use letschat_core::models::{new_message_id, ChatColor, ChatUser, ConnectivityState, GeoPoint, Message};
use letschat_core::remote::{ApiError, FirestoreClient, MemoryRemote, RemoteStore};
use letschat_core::{Config, FirebaseSettings, SyncCacheManager, SyncError, SyncNotice};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for the display name.
const MAX_NAME_LENGTH: usize = 32;

/// Maximum length for a chat input line.
const MAX_INPUT_LENGTH: usize = 1000;

/// Number of messages to scroll on page up/down.
pub const PAGE_SCROLL_SIZE: usize = 10;

// ============================================================================
// UI State Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Start,
    Chat,
}

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Start screen focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFocus {
    Name,
    Color,
    Button,
}

impl StartFocus {
    pub fn next(&self) -> Self {
        match self {
            StartFocus::Name => StartFocus::Color,
            StartFocus::Color => StartFocus::Button,
            StartFocus::Button => StartFocus::Name,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            StartFocus::Name => StartFocus::Button,
            StartFocus::Color => StartFocus::Name,
            StartFocus::Button => StartFocus::Color,
        }
    }
}

/// Chat screen focus: scrolling the history or typing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFocus {
    Messages,
    Input,
}

/// A parsed chat input line
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Text(String),
    Image(PathBuf),
    Location(GeoPoint),
}

/// Parse an input line. `/image <path>` and `/location <lat> <lon>` attach
/// content; anything else is sent as text.
pub fn parse_command(input: &str) -> Result<ChatCommand, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Nothing to send".to_string());
    }

    if let Some(rest) = trimmed.strip_prefix("/image") {
        let path = rest.trim();
        if path.is_empty() {
            return Err("Usage: /image <path>".to_string());
        }
        return Ok(ChatCommand::Image(PathBuf::from(path)));
    }

    if let Some(rest) = trimmed.strip_prefix("/location") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let [lat, lon] = parts.as_slice() else {
            return Err("Usage: /location <lat> <lon>".to_string());
        };
        let lat: f64 = lat.parse().map_err(|_| format!("Invalid latitude: {}", lat))?;
        let lon: f64 = lon.parse().map_err(|_| format!("Invalid longitude: {}", lon))?;
        return GeoPoint::new(lat, lon)
            .map(ChatCommand::Location)
            .map_err(|e| e.to_string());
    }

    Ok(ChatCommand::Text(trimmed.to_string()))
}

/// Connectivity handed to the sync manager. Forced offline mode wins; a
/// Firebase backend without a session cannot subscribe yet.
pub fn effective_connectivity(
    forced_offline: bool,
    probe: ConnectivityState,
    authenticated: bool,
) -> ConnectivityState {
    if forced_offline {
        ConnectivityState::Disconnected
    } else if probe.is_connected() && !authenticated {
        ConnectivityState::Unknown
    } else {
        probe
    }
}

/// Short, user-facing text for a failed send
pub fn send_error_message(error: &SyncError) -> String {
    match error {
        SyncError::OfflineSubmit(_) => "You are offline. Message not sent.".to_string(),
        SyncError::InvalidMessage(e) => format!("Invalid message: {}", e),
        SyncError::RemoteWrite(ApiError::Unauthorized) => {
            "Session expired. Reconnecting...".to_string()
        }
        SyncError::RemoteWrite(ApiError::NetworkError(_) | ApiError::Unavailable(_)) => {
            "Network error. Check your connection.".to_string()
        }
        other => format!("Error: {}", other),
    }
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent from spawned tasks back to the main loop.
enum BackgroundResult {
    SignedIn(SessionData),
    AuthFailed(String),
    Sent(String),
    SendFailed(String),
    ImageUploaded(String),
    UploadFailed(String),
}

/// Firebase-only services and session state
struct FirebaseBackend {
    settings: FirebaseSettings,
    auth: AuthClient,
    session: Session,
    token: BearerToken,
    uploader: Option<MediaUploader>,
    auth_pending: bool,
}

impl FirebaseBackend {
    fn authenticated(&self) -> bool {
        self.session.is_valid()
    }
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    pub config: Config,
    pub screen: Screen,
    pub state: AppState,

    // Start screen form
    pub name_input: String,
    pub selected_color: ChatColor,
    pub start_focus: StartFocus,

    // Chat screen
    pub user: ChatUser,
    pub manager: SyncCacheManager,
    pub chat_focus: ChatFocus,
    pub input: String,
    /// Messages scrolled up from the newest
    pub scroll: usize,
    pub status_message: Option<String>,
    pub forced_offline: bool,
    pub local_mode: bool,

    connectivity_rx: watch::Receiver<ConnectivityState>,
    applied_connectivity: Option<ConnectivityState>,
    _monitor: Option<ConnectivityMonitor>,
    _loopback_connectivity: Option<watch::Sender<ConnectivityState>>,
    notices: broadcast::Receiver<SyncNotice>,

    firebase: Option<FirebaseBackend>,

    background_rx: mpsc::Receiver<BackgroundResult>,
    background_tx: mpsc::Sender<BackgroundResult>,
}

impl App {
    /// Create the application from the saved config and the environment.
    /// `local` forces the in-memory loopback remote.
    pub fn new(local: bool) -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, "Cache directory configured");

        let firebase = if local { None } else { FirebaseSettings::from_env() };
        Self::with_config(config, cache_dir, firebase)
    }

    pub fn with_config(
        config: Config,
        cache_dir: PathBuf,
        firebase: Option<FirebaseSettings>,
    ) -> Result<Self> {
        let local_store: Arc<dyn LocalStore> = Arc::new(FileStore::new(cache_dir.clone())?);
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        let (remote, backend, connectivity_rx, monitor, loopback_tx) = match firebase {
            Some(settings) => {
                let mut session = Session::new(cache_dir);
                if let Err(e) = session.load() {
                    warn!(error = %e, "Failed to load session, signing in again");
                }
                let token = BearerToken::default();
                if let Some(id_token) = session.token() {
                    token.set(id_token);
                }

                let client = FirestoreClient::new(settings.firestore(), token.clone())?;
                let auth = AuthClient::new(settings.api_key.clone())?;
                let mut backend = FirebaseBackend {
                    settings,
                    auth,
                    session,
                    token,
                    uploader: None,
                    auth_pending: false,
                };
                backend.uploader = Self::build_uploader(&backend);

                let monitor = ConnectivityMonitor::spawn(probe_addr_from_env(), DEFAULT_PROBE_INTERVAL);
                let rx = monitor.subscribe();
                info!(project = %backend.settings.project_id, "Using Firestore backend");
                (Arc::new(client) as Arc<dyn RemoteStore>, Some(backend), rx, Some(monitor), None)
            }
            None => {
                info!("Using in-memory loopback backend");
                let (tx, rx) = watch::channel(ConnectivityState::Connected);
                (Arc::new(MemoryRemote::new()) as Arc<dyn RemoteStore>, None, rx, None, Some(tx))
            }
        };

        let manager = SyncCacheManager::new(remote, local_store);
        let notices = manager.notices();

        let user_id = backend
            .as_ref()
            .and_then(|b| b.session.user_id().map(str::to_string))
            .unwrap_or_else(|| format!("local-{}", new_message_id()));
        let name = config.display_name.clone().unwrap_or_default();

        Ok(Self {
            name_input: name.clone(),
            selected_color: config.background_color,
            start_focus: StartFocus::Name,
            forced_offline: config.offline_mode,
            local_mode: backend.is_none(),
            config,
            screen: Screen::Start,
            state: AppState::Normal,

            user: ChatUser::new(user_id, name),
            manager,
            chat_focus: ChatFocus::Messages,
            input: String::new(),
            scroll: 0,
            status_message: None,

            connectivity_rx,
            applied_connectivity: None,
            _monitor: monitor,
            _loopback_connectivity: loopback_tx,
            notices,

            firebase: backend,

            background_rx: rx,
            background_tx: tx,
        })
    }

    fn build_uploader(backend: &FirebaseBackend) -> Option<MediaUploader> {
        let bucket = backend.settings.storage_bucket.as_ref()?;
        let user_id = backend.session.user_id()?;
        match MediaUploader::new(bucket.clone(), user_id, backend.token.clone()) {
            Ok(uploader) => Some(uploader),
            Err(e) => {
                warn!(error = %e, "Failed to create media uploader");
                None
            }
        }
    }

    // =========================================================================
    // Start screen
    // =========================================================================

    /// Leave the start screen: persist the choices and begin syncing
    pub fn start_chat(&mut self) {
        let name = self.name_input.trim().to_string();
        self.user.name = name.clone();
        self.config.display_name = (!name.is_empty()).then_some(name);
        self.config.background_color = self.selected_color;
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        self.screen = Screen::Chat;
        self.chat_focus = ChatFocus::Messages;
        info!(name = %self.user.display_name(), "Entering chat");
        self.ensure_session();
    }

    // =========================================================================
    // Session
    // =========================================================================

    fn ensure_session(&mut self) {
        let Some(backend) = self.firebase.as_mut() else {
            return;
        };
        if backend.auth_pending || !backend.session.needs_refresh() {
            return;
        }
        if !self.connectivity_rx.borrow().is_connected() || self.forced_offline {
            return;
        }

        backend.auth_pending = true;
        let auth = backend.auth.clone();
        let existing = backend.session.data.clone();
        let tx = self.background_tx.clone();

        tokio::spawn(async move {
            let result = match existing {
                Some(ref data) => match auth.refresh(data).await {
                    Ok(data) => Ok(data),
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed, signing in again");
                        auth.sign_in_anonymously().await
                    }
                },
                None => auth.sign_in_anonymously().await,
            };
            let message = match result {
                Ok(data) => BackgroundResult::SignedIn(data),
                Err(e) => BackgroundResult::AuthFailed(e.to_string()),
            };
            let _ = tx.send(message).await;
        });
    }

    fn authenticated(&self) -> bool {
        self.firebase.as_ref().map_or(true, FirebaseBackend::authenticated)
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    pub fn connectivity(&self) -> ConnectivityState {
        effective_connectivity(
            self.forced_offline,
            *self.connectivity_rx.borrow(),
            self.authenticated(),
        )
    }

    pub fn toggle_offline(&mut self) {
        self.forced_offline = !self.forced_offline;
        self.config.offline_mode = self.forced_offline;
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        self.status_message = Some(if self.forced_offline {
            "Offline mode: showing cached messages".to_string()
        } else {
            "Going online...".to_string()
        });
        if self.chat_focus == ChatFocus::Input && self.forced_offline {
            self.chat_focus = ChatFocus::Messages;
        }
    }

    /// Whether the input line is shown. It is hidden without a live
    /// subscription, so offline messages are never typed.
    pub fn input_visible(&self) -> bool {
        self.manager.is_live()
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send the current input line
    pub fn send_input(&mut self) {
        let command = match parse_command(&self.input) {
            Ok(command) => command,
            Err(msg) => {
                self.status_message = Some(msg);
                return;
            }
        };
        self.input.clear();
        self.scroll = 0;

        match command {
            ChatCommand::Text(text) => self.submit(Message::text(self.user.clone(), text)),
            ChatCommand::Location(point) => self.submit(Message::location(self.user.clone(), point)),
            ChatCommand::Image(path) => self.upload_image(path),
        }
    }

    fn submit(&mut self, message: Message) {
        let manager = self.manager.clone();
        let tx = self.background_tx.clone();
        tokio::spawn(async move {
            let id = message.id.clone();
            let result = match manager.submit(message).await {
                Ok(()) => BackgroundResult::Sent(id),
                Err(e) => {
                    warn!(error = %e, "Failed to send message");
                    BackgroundResult::SendFailed(send_error_message(&e))
                }
            };
            let _ = tx.send(result).await;
        });
    }

    fn upload_image(&mut self, path: PathBuf) {
        if self.local_mode {
            // Loopback messages reference the local file directly
            let url = match std::fs::canonicalize(&path) {
                Ok(abs) => format!("file://{}", abs.display()),
                Err(e) => {
                    self.status_message = Some(format!("Cannot read {}: {}", path.display(), e));
                    return;
                }
            };
            self.submit(Message::image(self.user.clone(), url));
            return;
        }

        let Some(uploader) = self.firebase.as_ref().and_then(|b| b.uploader.clone()) else {
            self.status_message = Some("Image upload needs LETSCHAT_STORAGE_BUCKET".to_string());
            return;
        };

        let tx = self.background_tx.clone();
        tokio::spawn(async move {
            let result = match uploader.upload_image(&path).await {
                Ok(url) => BackgroundResult::ImageUploaded(url),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Image upload failed");
                    BackgroundResult::UploadFailed(e.to_string())
                }
            };
            let _ = tx.send(result).await;
        });
        self.status_message = Some("Uploading image...".to_string());
    }

    // =========================================================================
    // Main loop hook
    // =========================================================================

    /// Apply background results, connectivity changes and sync notices
    pub async fn check_background_tasks(&mut self) {
        let results: Vec<BackgroundResult> = {
            let mut results = Vec::new();
            while let Ok(result) = self.background_rx.try_recv() {
                results.push(result);
            }
            results
        };
        for result in results {
            self.process_background_result(result);
        }

        while let Ok(notice) = self.notices.try_recv() {
            self.status_message = Some(match notice {
                SyncNotice::SubscriptionFailed(_) => {
                    "Lost connection to chat. Retrying when back online.".to_string()
                }
                SyncNotice::PersistenceFailed(_) => "Could not update offline cache".to_string(),
            });
        }

        if self.screen != Screen::Chat {
            return;
        }

        if self
            .firebase
            .as_ref()
            .is_some_and(|b| b.session.needs_refresh())
        {
            self.ensure_session();
        }

        let connectivity = self.connectivity();
        if self.applied_connectivity != Some(connectivity) {
            debug!(%connectivity, "Applying connectivity");
            self.applied_connectivity = Some(connectivity);
            self.manager.set_connectivity(connectivity).await;
            if !self.input_visible() && self.chat_focus == ChatFocus::Input {
                self.chat_focus = ChatFocus::Messages;
            }
        }
    }

    fn process_background_result(&mut self, result: BackgroundResult) {
        match result {
            BackgroundResult::SignedIn(data) => {
                if let Some(backend) = self.firebase.as_mut() {
                    backend.auth_pending = false;
                    backend.token.set(data.id_token.clone());
                    self.user.id = data.user_id.clone();
                    backend.session.update(data);
                    if let Err(e) = backend.session.save() {
                        warn!(error = %e, "Failed to save session");
                    }
                    backend.uploader = Self::build_uploader(backend);
                    info!(user_id = %self.user.id, "Session ready");
                }
            }
            BackgroundResult::AuthFailed(msg) => {
                if let Some(backend) = self.firebase.as_mut() {
                    backend.auth_pending = false;
                }
                self.status_message = Some(format!("Sign-in failed: {}", msg));
            }
            BackgroundResult::Sent(id) => {
                debug!(id = %id, "Send confirmed");
                self.status_message = None;
            }
            BackgroundResult::SendFailed(msg) => {
                self.status_message = Some(msg);
            }
            BackgroundResult::ImageUploaded(url) => {
                self.status_message = None;
                self.submit(Message::image(self.user.clone(), url));
            }
            BackgroundResult::UploadFailed(msg) => {
                self.status_message = Some(format!("Upload failed: {}", msg));
            }
        }
    }

    /// Stop the subscription and let pending cache writes finish
    pub async fn shutdown(&mut self) {
        self.manager.shutdown();
        self.manager.flush_persistence().await;
        info!("Sync stopped");
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a display name character should be accepted
pub fn can_add_name_char(current_len: usize, c: char) -> bool {
    current_len < MAX_NAME_LENGTH && is_valid_input_char(c)
}

/// Check if a chat input character should be accepted
pub fn can_add_input_char(current_len: usize, c: char) -> bool {
    current_len < MAX_INPUT_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
