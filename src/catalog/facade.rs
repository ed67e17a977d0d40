//! Catalog state between the front-end and the backend.
//!
//! The facade owns two `watch` channels, the artist listing and the artist
//! detail view. Operations mutate the parameters, query the backend and publish
//! the result; front-ends read snapshots or subscribe. Superseded queries are
//! not cancelled, the last response to arrive wins.

use crate::api_client::{
    Album, AlbumImageUpload, ApiError, Artist, ArtistQuery, CatalogService, FilePart, SortOrder,
};
use crate::catalog::{ArtistDetailState, ArtistListState};
use crate::configuration::CatalogSettings;
use crate::notice::Notices;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

const ARTISTS_LOAD_ERROR: &str = "Erro ao carregar artistas";
const ARTIST_DETAIL_ERROR: &str = "Erro ao carregar detalhes do artista";
const ALBUMS_LOAD_ERROR: &str = "Erro ao carregar álbuns";

#[derive(Clone)]
pub struct CatalogFacade {
    service: CatalogService,
    notices: Notices,
    album_page_size: u32,
    list: Arc<watch::Sender<ArtistListState>>,
    detail: Arc<watch::Sender<ArtistDetailState>>,
}

impl CatalogFacade {
    pub fn new(service: CatalogService, notices: Notices, settings: &CatalogSettings) -> Self {
        let (list, _) = watch::channel(ArtistListState::new(settings.page_size));
        let (detail, _) = watch::channel(ArtistDetailState::default());

        Self {
            service,
            notices,
            album_page_size: settings.album_page_size.max(1),
            list: Arc::new(list),
            detail: Arc::new(detail),
        }
    }

    pub fn artists(&self) -> watch::Receiver<ArtistListState> {
        self.list.subscribe()
    }

    pub fn artist_detail(&self) -> watch::Receiver<ArtistDetailState> {
        self.detail.subscribe()
    }

    pub fn list_snapshot(&self) -> ArtistListState {
        self.list.borrow().clone()
    }

    pub fn detail_snapshot(&self) -> ArtistDetailState {
        self.detail.borrow().clone()
    }

    // --- artist listing ---

    pub async fn load_artists(&self) -> Result<(), ApiError> {
        self.list.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let query = {
            let state = self.list.borrow();
            ArtistQuery {
                name: Some(state.search_term.clone()).filter(|t| !t.is_empty()),
                page: state.current_page.saturating_sub(1),
                size: state.page_size,
                sort: state.sort,
            }
        };

        match self.service.list_artists(&query).await {
            Ok(page) => {
                debug!(count = page.content.len(), total = page.total_elements, "artists loaded");
                self.list.send_modify(|s| {
                    s.artists = page.content;
                    s.total = page.total_elements;
                    s.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load artists");
                self.list.send_modify(|s| {
                    s.artists.clear();
                    s.total = 0;
                    s.loading = false;
                    s.error = Some(ARTISTS_LOAD_ERROR.to_string());
                });
                Err(e)
            }
        }
    }

    /// New search term, back to the first page.
    pub async fn search_artists(&self, search_term: &str) -> Result<(), ApiError> {
        let term = search_term.trim().to_string();
        self.list.send_modify(|s| {
            s.search_term = term;
            s.current_page = 1;
        });
        self.load_artists().await
    }

    /// Moves to `page` (1-based). Pages outside the known range are ignored.
    pub async fn go_to_page(&self, page: u32) -> Result<(), ApiError> {
        let total_pages = self.list.borrow().total_pages();
        if page < 1 || page > total_pages {
            debug!(page, total_pages, "page out of range, ignored");
            return Ok(());
        }

        self.list.send_modify(|s| s.current_page = page);
        self.load_artists().await
    }

    pub async fn next_page(&self) -> Result<(), ApiError> {
        let (has_next, current) = {
            let state = self.list.borrow();
            (state.has_next_page(), state.current_page)
        };
        if has_next {
            self.go_to_page(current + 1).await
        } else {
            Ok(())
        }
    }

    pub async fn previous_page(&self) -> Result<(), ApiError> {
        let current = self.list.borrow().current_page;
        if current > 1 {
            self.go_to_page(current - 1).await
        } else {
            Ok(())
        }
    }

    pub async fn set_sort(&self, sort: SortOrder) -> Result<(), ApiError> {
        self.list.send_modify(|s| {
            s.sort = sort;
            s.current_page = 1;
        });
        self.load_artists().await
    }

    /// Replaces term, ordering and page size at once, back to the first page.
    pub async fn query_artists(
        &self,
        search_term: &str,
        sort: SortOrder,
        page_size: u32,
    ) -> Result<(), ApiError> {
        let term = search_term.trim().to_string();
        self.list.send_modify(|s| {
            s.search_term = term;
            s.sort = sort;
            s.page_size = page_size.max(1);
            s.current_page = 1;
        });
        self.load_artists().await
    }

    pub async fn set_page_size(&self, page_size: u32) -> Result<(), ApiError> {
        self.list.send_modify(|s| {
            s.page_size = page_size.max(1);
            s.current_page = 1;
        });
        self.load_artists().await
    }

    // --- artist detail ---

    /// Loads the artist, then the first page of its albums.
    pub async fn load_artist_detail(&self, artist_id: i64) -> Result<(), ApiError> {
        self.detail.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.service.get_artist(artist_id).await {
            Ok(artist) => {
                self.detail.send_modify(|s| {
                    s.current_artist = Some(artist);
                    s.loading = false;
                });
                self.load_albums_by_artist(artist_id, 0, self.album_page_size)
                    .await
            }
            Err(e) => {
                error!(artist_id, error = %e, "failed to load artist");
                self.detail.send_modify(|s| {
                    *s = ArtistDetailState {
                        error: Some(ARTIST_DETAIL_ERROR.to_string()),
                        ..ArtistDetailState::default()
                    };
                });
                Err(e)
            }
        }
    }

    /// Loads one page (0-based) of an artist's albums.
    pub async fn load_albums_by_artist(
        &self,
        artist_id: i64,
        page: u32,
        size: u32,
    ) -> Result<(), ApiError> {
        self.detail.send_modify(|s| s.albums_loading = true);

        match self
            .service
            .list_albums(artist_id, page, size, SortOrder::default())
            .await
        {
            Ok(albums) => {
                self.detail.send_modify(|s| {
                    s.albums = albums.content;
                    s.albums_total = albums.total_elements;
                    s.albums_page = albums.page;
                    s.albums_total_pages = albums.total_pages;
                    s.albums_loading = false;
                });
                Ok(())
            }
            Err(e) => {
                error!(artist_id, page, error = %e, "failed to load albums");
                self.detail.send_modify(|s| {
                    s.albums.clear();
                    s.albums_total = 0;
                    s.albums_total_pages = 0;
                    s.albums_loading = false;
                    s.error = Some(ALBUMS_LOAD_ERROR.to_string());
                });
                Err(e)
            }
        }
    }

    pub async fn go_to_album_page(&self, artist_id: i64, page: u32) -> Result<(), ApiError> {
        self.load_albums_by_artist(artist_id, page, self.album_page_size)
            .await
    }

    /// Selects an album and loads its gallery. On failure the gallery is empty.
    pub async fn load_album_images(&self, album_id: i64) -> Result<(), ApiError> {
        match self.service.album_images(album_id).await {
            Ok(images) => {
                self.detail.send_modify(|s| {
                    s.selected_album_id = Some(album_id);
                    s.selected_album_images = images;
                });
                Ok(())
            }
            Err(e) => {
                warn!(album_id, error = %e, "failed to load album images");
                self.detail.send_modify(|s| {
                    s.selected_album_id = Some(album_id);
                    s.selected_album_images.clear();
                });
                Err(e)
            }
        }
    }

    pub fn clear_selected_album_images(&self) {
        self.detail.send_modify(|s| {
            s.selected_album_id = None;
            s.selected_album_images.clear();
        });
    }

    /// Leaves the detail view.
    pub fn clear_artist_detail(&self) {
        self.detail.send_replace(ArtistDetailState::default());
    }

    // --- mutations ---

    pub async fn create_artist(&self, name: &str) -> Result<Artist, ApiError> {
        let artist = self
            .service
            .create_artist(name.trim())
            .await
            .inspect_err(|e| self.report(e))?;

        self.notices.success("Artista criado com sucesso!");
        self.reload_list().await;
        Ok(artist)
    }

    pub async fn update_artist(&self, artist_id: i64, name: &str) -> Result<Artist, ApiError> {
        let artist = self
            .service
            .update_artist(artist_id, name.trim())
            .await
            .inspect_err(|e| self.report(e))?;

        self.notices.success("Artista atualizado com sucesso!");
        self.detail.send_if_modified(|s| match &s.current_artist {
            Some(current) if current.id == artist.id => {
                s.current_artist = Some(artist.clone());
                true
            }
            _ => false,
        });
        self.reload_list().await;
        Ok(artist)
    }

    pub async fn create_album(&self, artist_id: i64, title: &str) -> Result<Album, ApiError> {
        let album = self
            .service
            .create_album(artist_id, title.trim())
            .await
            .inspect_err(|e| self.report(e))?;

        self.notices.success("Álbum criado com sucesso!");
        self.reload_albums_of(artist_id).await;
        Ok(album)
    }

    pub async fn update_album(
        &self,
        album_id: i64,
        artist_id: i64,
        title: &str,
    ) -> Result<Album, ApiError> {
        let album = self
            .service
            .update_album(album_id, artist_id, title.trim())
            .await
            .inspect_err(|e| self.report(e))?;

        self.notices.success("Álbum atualizado com sucesso!");
        self.reload_albums_of(artist_id).await;
        Ok(album)
    }

    pub async fn upload_album_images(
        &self,
        album_id: i64,
        files: Vec<FilePart>,
        set_as_default: bool,
    ) -> Result<AlbumImageUpload, ApiError> {
        let upload = self
            .service
            .upload_album_images(album_id, files, set_as_default)
            .await
            .inspect_err(|e| self.report(e))?;

        self.notices.success(
            upload
                .message
                .clone()
                .unwrap_or_else(|| "Imagens enviadas com sucesso!".to_string()),
        );

        if self.detail.borrow().selected_album_id == Some(album_id) {
            // the gallery failing to reload is not a failed upload
            if let Err(e) = self.load_album_images(album_id).await {
                warn!(album_id, error = %e, "gallery not refreshed after upload");
            }
        }
        Ok(upload)
    }

    pub async fn set_default_image(&self, album_id: i64, image_id: i64) -> Result<(), ApiError> {
        self.service
            .set_default_image(album_id, image_id)
            .await
            .inspect_err(|e| self.report(e))?;

        self.detail.send_if_modified(|s| {
            if s.selected_album_id != Some(album_id) {
                return false;
            }
            for image in &mut s.selected_album_images {
                image.is_default = image.id == image_id;
            }
            true
        });
        self.notices.success("Imagem padrão definida!");
        Ok(())
    }

    /// Surfaces failures that have no dedicated channel. Auth failures are
    /// handled by the session, rate limits by the interceptor and validation
    /// errors by the caller.
    fn report(&self, e: &ApiError) {
        match e {
            ApiError::Auth(_) | ApiError::RateLimited { .. } | ApiError::Validation { .. } => {
                debug!(error = %e, "catalog mutation refused");
            }
            _ => {
                error!(error = %e, "catalog mutation failed");
                self.notices.error(e.user_message());
            }
        }
    }

    async fn reload_list(&self) {
        if let Err(e) = self.load_artists().await {
            warn!(error = %e, "artist list not refreshed");
        }
    }

    async fn reload_albums_of(&self, artist_id: i64) {
        let page = {
            let state = self.detail.borrow();
            match &state.current_artist {
                Some(artist) if artist.id == artist_id => Some(state.albums_page),
                _ => None,
            }
        };

        if let Some(page) = page {
            if let Err(e) = self.go_to_album_page(artist_id, page).await {
                warn!(artist_id, error = %e, "album list not refreshed");
            }
        }
    }
}
