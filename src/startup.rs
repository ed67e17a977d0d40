//! # Wiring and command handlers
//!
//! `App` assembles the client from the configuration: the persisted session,
//! the HTTP transport, the auth gateway and interceptor, the catalog facade and
//! the notification stream. `run` executes one CLI command against it.
//!
//! Every command first goes through the route guard, exactly like a navigation
//! in a graphical front-end would.
//!
use crate::api_client::{
    ApiError, AuthInterceptor, CatalogService, FilePart, HttpTransport, LoginRequest,
    ReqwestTransport, SortOrder,
};
use crate::auth::{AuthGateway, GuardDecision, Route, RouteGuard, SessionState};
use crate::catalog::CatalogFacade;
use crate::configuration::{self, ConfigFolder, Settings};
use crate::foundation::session_store::{open_token_store, TokenStore};
use crate::foundation::utils::image_mime_type;
use crate::notice::{NoticeLevel, Notices};
use crate::notifications::{ConnectionStatus, NotificationFeed, NotificationStream};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, time::Duration};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info};
use walkdir::WalkDir;

/// A parsed CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        username: String,
        password: Option<String>,
    },
    Logout,
    WhoAmI,
    Artists {
        search: String,
        page: u32,
        size: Option<u32>,
        sort: SortOrder,
    },
    Artist {
        id: i64,
        album_page: u32,
    },
    Albums {
        artist_id: i64,
        page: u32,
    },
    Images {
        album_id: i64,
    },
    ArtistCreate {
        name: String,
    },
    ArtistUpdate {
        id: i64,
        name: String,
    },
    AlbumCreate {
        artist_id: i64,
        title: String,
    },
    AlbumUpdate {
        id: i64,
        artist_id: i64,
        title: String,
    },
    Upload {
        album_id: i64,
        path: PathBuf,
        set_default: bool,
    },
    SetDefault {
        album_id: i64,
        image_id: i64,
    },
    Watch,
}

impl Command {
    /// View the command corresponds to, checked by the route guard.
    pub fn route(&self) -> Route {
        match self {
            Command::Login { .. } | Command::Logout => Route::Login { return_url: None },
            Command::WhoAmI => Route::Home,
            Command::Artists { .. } | Command::ArtistCreate { .. } => Route::Artists,
            Command::Artist { id, .. } | Command::ArtistUpdate { id, .. } => {
                Route::ArtistDetail(*id)
            }
            Command::Albums { artist_id, .. }
            | Command::AlbumCreate { artist_id, .. }
            | Command::AlbumUpdate { artist_id, .. } => Route::ArtistDetail(*artist_id),
            Command::Images { album_id }
            | Command::Upload { album_id, .. }
            | Command::SetDefault { album_id, .. } => Route::AlbumImages(*album_id),
            Command::Watch => Route::Notifications,
        }
    }
}

pub struct App {
    pub settings: Settings,
    pub session: SessionState,
    pub gateway: AuthGateway,
    pub catalog: CatalogFacade,
    pub notices: Notices,
    pub guard: RouteGuard,
    pub notifications: NotificationStream,
}

impl App {
    /// Loads the configuration and the session store of `cfg_folder`.
    pub fn open(cfg_folder: &ConfigFolder) -> anyhow::Result<Self> {
        let config_file = cfg_folder
            .config_file
            .to_str()
            .context("configuration path is not valid UTF-8")?;
        let settings = configuration::get_configuration(config_file)
            .context("Unable to parse configuration file")?;

        let db_path = cfg_folder
            .session_db
            .to_str()
            .context("session store path is not valid UTF-8")?;
        let store = open_token_store(db_path).context("Unable to open the session store")?;

        Ok(Self::build(settings, store)?)
    }

    pub fn build(settings: Settings, store: TokenStore) -> Result<Self, ApiError> {
        let session = SessionState::restore(store)?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            &settings.api.base_url,
            settings.api.timeout(),
        )?);

        let notices = Notices::new();
        let gateway = AuthGateway::new(transport.clone(), session.clone(), &settings.endpoints);
        let interceptor = AuthInterceptor::new(transport, gateway.clone(), notices.clone());
        let service = CatalogService::new(interceptor, &settings.endpoints);
        let catalog = CatalogFacade::new(service, notices.clone(), &settings.catalog);
        let notifications =
            NotificationStream::new(settings.notifications.clone(), NotificationFeed::new());

        Ok(Self {
            guard: RouteGuard::new(session.clone()),
            settings,
            session,
            gateway,
            catalog,
            notices,
            notifications,
        })
    }

    /// Runs one command. Returns `false` when the guard refused it.
    pub async fn execute(&self, command: Command) -> Result<bool, ApiError> {
        if let GuardDecision::Redirect(login) = self.guard.check(&command.route()) {
            eprintln!("\x1b[1m\x1b[31mVocê precisa estar autenticado.\x1b[0m");
            eprintln!("Execute 'musicatalog login' primeiro ({}).", login.path());
            return Ok(false);
        }

        match command {
            Command::Login { username, password } => self.login(username, password).await?,
            Command::Logout => {
                self.gateway.logout();
                println!("\x1b[32mSessão encerrada.\x1b[0m");
            }
            Command::WhoAmI => self.who_am_i(),
            Command::Artists {
                search,
                page,
                size,
                sort,
            } => self.artists(&search, page, size, sort).await?,
            Command::Artist { id, album_page } => self.artist(id, album_page).await?,
            Command::Albums { artist_id, page } => {
                let result = self.catalog.go_to_album_page(artist_id, page).await;
                self.print_albums();
                result?
            }
            Command::Images { album_id } => {
                let result = self.catalog.load_album_images(album_id).await;
                self.print_images(album_id);
                result?
            }
            Command::ArtistCreate { name } => {
                let artist = self.catalog.create_artist(&name).await?;
                println!("#{} {}", artist.id, artist.name);
            }
            Command::ArtistUpdate { id, name } => {
                let artist = self.catalog.update_artist(id, &name).await?;
                println!("#{} {}", artist.id, artist.name);
            }
            Command::AlbumCreate { artist_id, title } => {
                let album = self.catalog.create_album(artist_id, &title).await?;
                println!("#{} {} ({})", album.id, album.title, album.artist_name);
            }
            Command::AlbumUpdate {
                id,
                artist_id,
                title,
            } => {
                let album = self.catalog.update_album(id, artist_id, &title).await?;
                println!("#{} {} ({})", album.id, album.title, album.artist_name);
            }
            Command::Upload {
                album_id,
                path,
                set_default,
            } => self.upload(album_id, &path, set_default).await?,
            Command::SetDefault { album_id, image_id } => {
                self.catalog.set_default_image(album_id, image_id).await?
            }
            Command::Watch => self.watch().await?,
        }
        Ok(true)
    }

    async fn login(&self, username: String, password: Option<String>) -> Result<(), ApiError> {
        let password = match password {
            Some(password) => password,
            None => prompt("Senha: ")?,
        };

        let user = self
            .gateway
            .login(&LoginRequest { username, password })
            .await?;
        self.notices
            .success(format!("Bem-vindo, {}!", user.username));
        Ok(())
    }

    fn who_am_i(&self) {
        match self.session.user() {
            Some(user) => println!("{} ({})", user.username, user.role),
            None => println!("Sessão ativa restaurada do armazenamento local."),
        }
    }

    async fn artists(
        &self,
        search: &str,
        page: u32,
        size: Option<u32>,
        sort: SortOrder,
    ) -> Result<(), ApiError> {
        let size = size.unwrap_or(self.settings.catalog.page_size);
        let mut result = self.catalog.query_artists(search, sort, size).await;
        if result.is_ok() && page > 1 {
            result = self.catalog.go_to_page(page).await;
        }

        let state = self.catalog.list_snapshot();
        if let Some(error) = &state.error {
            eprintln!("\x1b[31m{error}\x1b[0m");
            return result;
        }

        if state.artists.is_empty() {
            println!("\x1b[33mNenhum artista encontrado.\x1b[0m");
        }
        for artist in &state.artists {
            println!("\x1b[1m#{:<5}\x1b[0m {}", artist.id, artist.name);
        }
        println!(
            "\x1b[34mPágina {} de {} ({} artistas)\x1b[0m",
            state.current_page,
            state.total_pages().max(1),
            state.total
        );
        result
    }

    async fn artist(&self, id: i64, album_page: u32) -> Result<(), ApiError> {
        let mut result = self.catalog.load_artist_detail(id).await;
        if result.is_ok() && album_page > 0 {
            result = self.catalog.go_to_album_page(id, album_page).await;
        }

        let detail = self.catalog.detail_snapshot();
        if let Some(artist) = &detail.current_artist {
            println!("\x1b[1m\x1b[32m{}\x1b[0m (#{})", artist.name, artist.id);
            if let Some(image) = &artist.image_url {
                println!("  imagem: {image}");
            }
        }
        self.print_albums();
        result
    }

    fn print_albums(&self) {
        let detail = self.catalog.detail_snapshot();
        if let Some(error) = &detail.error {
            eprintln!("\x1b[31m{error}\x1b[0m");
            return;
        }

        if detail.albums.is_empty() {
            println!("\x1b[33mNenhum álbum cadastrado.\x1b[0m");
            return;
        }
        for album in &detail.albums {
            let cover = album
                .default_image()
                .and_then(|image| image.file_url.as_deref())
                .unwrap_or("-");
            println!("  #{:<5} {}  [{}]", album.id, album.title, cover);
        }
        println!(
            "\x1b[34mPágina {} de {} ({} álbuns)\x1b[0m",
            detail.albums_page + 1,
            detail.albums_total_pages.max(1),
            detail.albums_total
        );
    }

    fn print_images(&self, album_id: i64) {
        let detail = self.catalog.detail_snapshot();
        if detail.selected_album_images.is_empty() {
            println!("\x1b[33mO álbum #{album_id} não tem imagens.\x1b[0m");
            return;
        }
        for image in &detail.selected_album_images {
            let marker = if image.is_default { "*" } else { " " };
            println!(
                "{marker} #{:<5} {}",
                image.id,
                image.file_url.as_deref().unwrap_or(&image.file_key)
            );
        }
    }

    async fn upload(&self, album_id: i64, path: &Path, set_default: bool) -> Result<(), ApiError> {
        let files = collect_images(path)?;
        if files.is_empty() {
            println!("\x1b[33mNenhuma imagem encontrada em {}.\x1b[0m", path.display());
            return Ok(());
        }

        let progress = ProgressBar::new(files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "{elapsed_precise} [{bar:40.cyan/blue}] {pos}/{len} imagens {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );

        let mut parts = Vec::with_capacity(files.len());
        for (file, mime_type) in files {
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            progress.set_message(file_name.clone());
            parts.push(FilePart {
                bytes: fs::read(&file)?,
                file_name,
                mime_type: mime_type.to_string(),
            });
            progress.inc(1);
        }

        progress.set_message("enviando...");
        progress.enable_steady_tick(Duration::from_millis(120));
        let result = self
            .catalog
            .upload_album_images(album_id, parts, set_default)
            .await;
        progress.finish_and_clear();

        let upload = result?;
        for image in &upload.images {
            let marker = if image.is_default { "*" } else { " " };
            println!("{marker} #{:<5} {}", image.id, image.file_key);
        }
        Ok(())
    }

    /// Streams notifications until Ctrl-C.
    async fn watch(&self) -> Result<(), ApiError> {
        let feed = self.notifications.feed().clone();
        let mut feed_rx = feed.subscribe();
        let mut status_rx = self.notifications.status();
        let follower = self.notifications.follow_session(&self.session);

        println!("\x1b[1m\x1b[34mAguardando notificações (Ctrl-C para sair)...\x1b[0m");
        let mut seen = feed_rx.borrow_and_update().notifications.len();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    match *status_rx.borrow_and_update() {
                        ConnectionStatus::Connected => println!("\x1b[32mConectado.\x1b[0m"),
                        ConnectionStatus::Connecting => info!("connecting to notification stream"),
                        ConnectionStatus::Disconnected => println!("\x1b[33mDesconectado.\x1b[0m"),
                    }
                }
                changed = feed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = feed_rx.borrow_and_update().clone();
                    let fresh = state.notifications.len().saturating_sub(seen);
                    for notification in state.notifications.iter().take(fresh).rev() {
                        println!(
                            "\x1b[1m[{}]\x1b[0m {}",
                            notification.timestamp.format("%d/%m/%Y %H:%M"),
                            notification.message
                        );
                    }
                    seen = state.notifications.len();
                    println!("\x1b[34m{} não lida(s)\x1b[0m", state.unread_count);
                }
            }
        }

        follower.abort();
        self.notifications.disconnect().await;
        Ok(())
    }
}

/// Image files under `path`, or `path` itself when it is a file.
fn collect_images(path: &Path) -> io::Result<Vec<(PathBuf, &'static str)>> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        ));
    }

    let mut files: Vec<(PathBuf, &'static str)> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let mime_type = entry.file_name().to_str().and_then(image_mime_type)?;
            Some((entry.into_path(), mime_type))
        })
        .collect();

    files.sort();
    Ok(files)
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Prints every notice published so far. Returns whether any of them was a
/// warning or an error.
fn drain_notices(notices: &mut broadcast::Receiver<crate::notice::Notice>) -> bool {
    let mut alerted = false;
    loop {
        match notices.try_recv() {
            Ok(notice) => {
                let color = match notice.level {
                    NoticeLevel::Success => "32",
                    NoticeLevel::Info => "34",
                    NoticeLevel::Warning => "33",
                    NoticeLevel::Error => "31",
                };
                alerted |= matches!(notice.level, NoticeLevel::Warning | NoticeLevel::Error);
                println!("\x1b[{color}m{}\x1b[0m", notice.message);
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return alerted,
        }
    }
}

/// Prints a failed command the way the user should see it.
fn report_failure(e: &ApiError, already_alerted: bool) {
    match e {
        ApiError::Auth(_) => {
            eprintln!("\x1b[1m\x1b[31m{}\x1b[0m", e.user_message());
            eprintln!("Execute 'musicatalog login' para entrar novamente.");
        }
        ApiError::Validation { message, fields, .. } => {
            eprintln!("\x1b[31m{message}\x1b[0m");
            for (field, problem) in fields {
                eprintln!("  - {field}: {problem}");
            }
        }
        _ => {
            error!(error = %e, "command failed");
            if !already_alerted {
                eprintln!("\x1b[31m{}\x1b[0m", e.user_message());
            }
        }
    }
}

pub async fn run(cfg_folder: ConfigFolder, command: Command) -> anyhow::Result<()> {
    if !cfg_folder.is_configured() {
        eprintln!(
            "\x1b[1m\x1b[31mConfiguration folder or config.yaml not found. Please run 'musicatalog config' first.\x1b[0m"
        );
        return Ok(());
    }

    let app = App::open(&cfg_folder)?;
    let mut notices = app.notices.subscribe();

    let result = app.execute(command).await;
    let alerted = drain_notices(&mut notices);
    finish(result, alerted)
}

/// Turns a command outcome into the process result so a refused or failed
/// command exits non-zero.
fn finish(result: Result<bool, ApiError>, alerted: bool) -> anyhow::Result<()> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => anyhow::bail!("authentication required"),
        Err(e) => {
            report_failure(&e, alerted);
            Err(anyhow::Error::new(e))
        }
    }
}
