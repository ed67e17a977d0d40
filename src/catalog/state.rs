use crate::api_client::{Album, AlbumImage, Artist, SortOrder};

/// Artist listing as shown to the user. `current_page` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistListState {
    pub artists: Vec<Artist>,
    pub total: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub search_term: String,
    pub sort: SortOrder,
    pub loading: bool,
    pub error: Option<String>,
}

impl ArtistListState {
    pub fn new(page_size: u32) -> Self {
        Self {
            artists: Vec::new(),
            total: 0,
            current_page: 1,
            page_size: page_size.max(1),
            search_term: String::new(),
            sort: SortOrder::default(),
            loading: false,
            error: None,
        }
    }

    pub fn total_pages(&self) -> u32 {
        u32::try_from(self.total.div_ceil(u64::from(self.page_size))).unwrap_or(u32::MAX)
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }
}

/// One artist's page: its albums and the gallery of the selected album.
/// `albums_page` is 0-based, as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistDetailState {
    pub current_artist: Option<Artist>,
    pub loading: bool,
    pub error: Option<String>,
    pub albums: Vec<Album>,
    pub albums_total: u64,
    pub albums_page: u32,
    pub albums_total_pages: u32,
    pub albums_loading: bool,
    pub selected_album_id: Option<i64>,
    pub selected_album_images: Vec<AlbumImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        let mut state = ArtistListState::new(12);
        assert_eq!(state.total_pages(), 0);

        state.total = 12;
        assert_eq!(state.total_pages(), 1);

        state.total = 25;
        assert_eq!(state.total_pages(), 3);
        assert!(state.has_next_page());
        assert!(!state.has_previous_page());
    }

    #[test]
    fn test_total_pages_saturates() {
        let mut state = ArtistListState::new(1);
        state.total = u64::from(u32::MAX) + 10;

        assert_eq!(state.total_pages(), u32::MAX);
        assert!(state.has_next_page());
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let state = ArtistListState::new(0);
        assert_eq!(state.page_size, 1);
    }
}
