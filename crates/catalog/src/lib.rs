mod genre;
mod index;

pub use genre::{
    default_groups, CanonicalGenre, GenreNormalizer, DEFAULT_DELIMITER, DEFAULT_GENRE_GROUPS,
    OTHER_GENRE,
};
pub use index::{decade_of, CatalogIndex, TrackGroup};
