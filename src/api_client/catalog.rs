//! Typed access to the artist, album and album-image endpoints.

use crate::api_client::{
    Album, AlbumImage, AlbumImageUpload, AlbumRequest, ApiError, ApiRequest, Artist,
    ArtistRequest, AuthInterceptor, FilePart, HttpMethod, Page,
};
use crate::configuration::Endpoints;

/// Placeholder pictures for artists, the backend stores none.
const ARTIST_PLACEHOLDERS: [&str; 14] = [
    "assets/artists/photo-1493225457124-a3eb161ffa5f.jpeg",
    "assets/artists/photo-1511671782779-c97d3d27a1d4.jpeg",
    "assets/artists/photo-1470229722913-7c0e2dbbafd3.jpeg",
    "assets/artists/photo-1459749411175-04bf5292ceea.jpeg",
    "assets/artists/photo-1514525253161-7a46d19cd819.jpeg",
    "assets/artists/photo-1516450360452-9312f5e86fc7.jpeg",
    "assets/artists/photo-1511735111819-9a3f7709049c.jpeg",
    "assets/artists/photo-1445985543470-41fba5c3144a.jpeg",
    "assets/artists/photo-1508700115892-45ecd05ae2ad.jpeg",
    "assets/artists/photo-1458560871784-56d23406c091.jpeg",
    "assets/artists/photo-1415201364774-f6f0bb35f28f.jpeg",
    "assets/artists/photo-1487180144351-b8472da7d491.jpeg",
    "assets/artists/photo-1498038432885-c6f3f1b912ee.jpeg",
    "assets/artists/photo-1511379938547-c1f69419868d.jpeg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Name,
}

impl SortField {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Artist listing parameters. `page` is 0-based, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistQuery {
    pub name: Option<String>,
    pub page: u32,
    pub size: u32,
    pub sort: SortOrder,
}

/// Deterministic placeholder picture for an artist.
pub fn placeholder_image(artist_id: i64) -> &'static str {
    let index = artist_id.rem_euclid(ARTIST_PLACEHOLDERS.len() as i64) as usize;
    ARTIST_PLACEHOLDERS[index]
}

fn with_placeholder(mut artist: Artist) -> Artist {
    if artist.image_url.is_none() {
        artist.image_url = Some(placeholder_image(artist.id).to_string());
    }
    artist
}

#[derive(Clone)]
pub struct CatalogService {
    interceptor: AuthInterceptor,
    artists_path: String,
    albums_path: String,
}

impl CatalogService {
    pub fn new(interceptor: AuthInterceptor, endpoints: &Endpoints) -> Self {
        Self {
            interceptor,
            artists_path: endpoints.artists.clone(),
            albums_path: endpoints.albums.clone(),
        }
    }

    pub async fn list_artists(&self, query: &ArtistQuery) -> Result<Page<Artist>, ApiError> {
        let mut request = ApiRequest::get(&self.artists_path)
            .with_query("albums", false)
            .with_query("page", query.page)
            .with_query("size", query.size)
            .with_query("sortBy", query.sort.field.as_param())
            .with_query("direction", query.sort.direction.as_param());

        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            request = request.with_query("name", name);
        }

        let mut page: Page<Artist> = self.interceptor.send_json(request).await?;
        page.content = page.content.into_iter().map(with_placeholder).collect();
        Ok(page)
    }

    pub async fn get_artist(&self, artist_id: i64) -> Result<Artist, ApiError> {
        let request = ApiRequest::get(format!("{}/{artist_id}", self.artists_path));
        self.interceptor
            .send_json(request)
            .await
            .map(with_placeholder)
    }

    pub async fn create_artist(&self, name: &str) -> Result<Artist, ApiError> {
        let body = ArtistRequest {
            name: name.to_string(),
        };
        let request = ApiRequest::post_json(&self.artists_path, &body)?;
        self.interceptor
            .send_json(request)
            .await
            .map(with_placeholder)
    }

    pub async fn update_artist(&self, artist_id: i64, name: &str) -> Result<Artist, ApiError> {
        let body = ArtistRequest {
            name: name.to_string(),
        };
        let request = ApiRequest::put_json(format!("{}/{artist_id}", self.artists_path), &body)?;
        self.interceptor
            .send_json(request)
            .await
            .map(with_placeholder)
    }

    pub async fn list_albums(
        &self,
        artist_id: i64,
        page: u32,
        size: u32,
        sort: SortOrder,
    ) -> Result<Page<Album>, ApiError> {
        let request = ApiRequest::get(&self.albums_path)
            .with_query("artistId", artist_id)
            .with_query("page", page)
            .with_query("size", size)
            .with_query("sortBy", sort.field.as_param())
            .with_query("direction", sort.direction.as_param());

        self.interceptor.send_json(request).await
    }

    pub async fn create_album(&self, artist_id: i64, title: &str) -> Result<Album, ApiError> {
        let body = AlbumRequest {
            title: title.to_string(),
            artist_id,
        };
        let request = ApiRequest::post_json(&self.albums_path, &body)?;
        self.interceptor.send_json(request).await
    }

    pub async fn update_album(
        &self,
        album_id: i64,
        artist_id: i64,
        title: &str,
    ) -> Result<Album, ApiError> {
        let body = AlbumRequest {
            title: title.to_string(),
            artist_id,
        };
        let request = ApiRequest::put_json(format!("{}/{album_id}", self.albums_path), &body)?;
        self.interceptor.send_json(request).await
    }

    pub async fn album_images(&self, album_id: i64) -> Result<Vec<AlbumImage>, ApiError> {
        let request = ApiRequest::get(self.images_path(album_id)).with_query("albumId", album_id);
        self.interceptor.send_json(request).await
    }

    pub async fn upload_album_images(
        &self,
        album_id: i64,
        files: Vec<FilePart>,
        set_as_default: bool,
    ) -> Result<AlbumImageUpload, ApiError> {
        let request = ApiRequest::new(HttpMethod::Post, self.images_path(album_id))
            .with_query("albumId", album_id)
            .with_query("setAsDefault", set_as_default)
            .with_files("files", files);
        self.interceptor.send_json(request).await
    }

    pub async fn set_default_image(
        &self,
        album_id: i64,
        image_id: i64,
    ) -> Result<AlbumImage, ApiError> {
        let request = ApiRequest::new(
            HttpMethod::Put,
            format!("{}/{image_id}/set-default", self.images_path(album_id)),
        )
        .with_query("albumId", album_id);
        self.interceptor.send_json(request).await
    }

    fn images_path(&self, album_id: i64) -> String {
        format!("{}/{album_id}/images", self.albums_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ApiResponse, HttpTransport, MockHttpTransport, RequestBody};
    use crate::auth::{AuthGateway, SessionState};
    use crate::foundation::session_store::TokenStore;
    use crate::notice::Notices;
    use serde_json::json;
    use std::sync::Arc;

    fn service(transport: MockHttpTransport) -> CatalogService {
        let transport: Arc<dyn HttpTransport> = Arc::new(transport);
        let session = SessionState::restore(TokenStore::temporary().unwrap()).unwrap();
        let endpoints = Endpoints::default();
        let gateway = AuthGateway::new(transport.clone(), session, &endpoints);
        let interceptor = AuthInterceptor::new(transport, gateway, Notices::new());
        CatalogService::new(interceptor, &endpoints)
    }

    fn has_query(request: &ApiRequest, key: &str, value: &str) -> bool {
        request
            .query
            .iter()
            .any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn test_placeholder_image_is_stable() {
        assert_eq!(placeholder_image(3), placeholder_image(17));
        assert_eq!(placeholder_image(0), ARTIST_PLACEHOLDERS[0]);
        assert_eq!(placeholder_image(-1), ARTIST_PLACEHOLDERS[13]);
    }

    #[tokio::test]
    async fn test_list_artists_query_parameters() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                r.path == "/v1/artist"
                    && has_query(r, "page", "2")
                    && has_query(r, "size", "12")
                    && has_query(r, "sortBy", "name")
                    && has_query(r, "direction", "DESC")
                    && has_query(r, "name", "mutantes")
                    && has_query(r, "albums", "false")
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    200,
                    json!({"content": [{"id": 4, "name": "Os Mutantes"}], "page": 2, "size": 12, "totalElements": 25, "totalPages": 3}),
                ))
            });

        let page = service(transport)
            .list_artists(&ArtistQuery {
                name: Some(" mutantes ".to_string()),
                page: 2,
                size: 12,
                sort: SortOrder {
                    field: SortField::Name,
                    direction: SortDirection::Desc,
                },
            })
            .await
            .unwrap();

        assert_eq!(page.total_elements, 25);
        assert_eq!(
            page.content[0].image_url.as_deref(),
            Some(placeholder_image(4))
        );
    }

    #[tokio::test]
    async fn test_blank_search_is_not_sent() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| !r.query.iter().any(|(k, _)| k == "name"))
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(200, json!({"content": []}))));

        let result = service(transport)
            .list_artists(&ArtistQuery {
                name: Some("   ".to_string()),
                page: 0,
                size: 12,
                sort: SortOrder::default(),
            })
            .await;

        assert!(result.unwrap().content.is_empty());
    }

    #[tokio::test]
    async fn test_create_album_body() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                r.method == HttpMethod::Post
                    && r.path == "/v1/album"
                    && r.body == RequestBody::Json(json!({"title": "Harakiri", "artistId": 1}))
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    201,
                    json!({"id": 9, "title": "Harakiri", "artistId": 1, "artistName": "Serj Tankian"}),
                ))
            });

        let album = service(transport).create_album(1, "Harakiri").await.unwrap();

        assert_eq!(album.id, 9);
        assert!(album.images.is_empty());
    }

    #[tokio::test]
    async fn test_upload_is_multipart() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                r.path == "/v1/album/9/images"
                    && has_query(r, "albumId", "9")
                    && has_query(r, "setAsDefault", "true")
                    && matches!(&r.body, RequestBody::Multipart { field, files } if field == "files" && files.len() == 2)
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    201,
                    json!({"images": [{"id": 1, "fileKey": "a", "isDefault": true}, {"id": 2, "fileKey": "b", "isDefault": false}], "message": "2 imagem(ns) carregada(s) com sucesso"}),
                ))
            });

        let files = vec![
            FilePart {
                file_name: "front.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                bytes: vec![1, 2, 3],
            },
            FilePart {
                file_name: "back.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![4, 5],
            },
        ];
        let upload = service(transport)
            .upload_album_images(9, files, true)
            .await
            .unwrap();

        assert_eq!(upload.images.len(), 2);
    }
}
