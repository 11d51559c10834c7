use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

pub const OTHER_GENRE: &str = "Other";
pub const DEFAULT_DELIMITER: char = ';';

/// Built-in grouping table. When a raw genre appears under several groups the
/// earliest group wins.
pub const DEFAULT_GENRE_GROUPS: &[(&str, &[&str])] = &[
    (
        "Rock",
        &[
            "Rock", "Classic Rock", "Hard Rock", "Soft Rock", "Arena Rock", "Art Rock",
            "Alternative Rock", "Indie Rock", "Progressive Rock", "Psychedelic Rock",
            "Blues Rock", "Country Rock", "Folk Rock", "Garage Rock", "Glam Rock",
            "Gothic Rock", "Grunge", "Heartland Rock", "Mainstream Rock", "Math Rock",
            "Noise Rock", "Post-Rock", "Punk Rock", "Southern Rock", "Stoner Rock",
            "Symphonic Rock", "Experimental Rock", "Electronic Rock", "Funk Rock",
            "Piano Rock", "Garage Rock Revival", "Desert Rock", "Boogie Rock", "Swamp Rock",
            "Roots Rock", "Dance-Rock", "Rap Rock", "Nu Metal", "Acoustic Rock", "AlternRock",
            "Britpop", "Crossover Prog", "Post-Grunge", "Post-Britpop", "Slacker Rock",
            "Beat Music",
        ],
    ),
    (
        "Pop",
        &[
            "Pop", "Pop Rock", "Dance-Pop", "Electropop", "Synth-Pop", "Art Pop",
            "Alternative Pop", "Indie Pop", "Dream Pop", "Power Pop", "Baroque Pop",
            "Chamber Pop", "Sunshine Pop", "Traditional Pop", "International Pop",
            "Ambient Pop", "Bedroom Pop", "Hypnagogic Pop", "Jangle Pop", "Noise Pop",
            "Twee Pop", "Progressive Pop", "Psychedelic Pop", "Sophisti-Pop", "Pop Soul",
            "Pop Metal", "Country Pop", "Latin Pop", "J-Pop", "K-Pop", "Pop Punk", "Pop Rap",
        ],
    ),
    (
        "Electronic",
        &[
            "Electronic", "Electronica", "Electro", "EDM", "Techno", "House", "Trance",
            "Dubstep", "Drum And Bass", "Drum & Bass", "Downtempo", "Breakbeat", "Breaks",
            "Big Beat", "Dance", "Electro House", "Deep House", "Tech House",
            "Progressive House", "Hard Techno", "Hardstyle", "Dark Electro", "Trip Hop",
            "Trip-Hop", "Chillwave", "Synthwave", "Indietronica", "Folktronica", "New Rave",
            "Jersey Club", "Leftfield", "IDM",
        ],
    ),
    (
        "Hip Hop",
        &[
            "Hip Hop", "Hip-Hop", "Rap", "Rap/Hip Hop", "Alternative Hip Hop",
            "East Coast Hip Hop", "West Coast Hip Hop", "Southern Hip Hop",
            "Conscious Hip Hop", "Political Hip Hop", "Experimental Hip Hop", "Cloud Rap",
            "Emo Rap", "Trap", "Grime", "Hip House", "Rap Metal", "Rapcore", "Country Rap",
            "Trap Latino", "Drill",
        ],
    ),
    (
        "Alternative",
        &[
            "Alternative", "Alternative Country", "Alternative Dance", "Alternative Folk",
            "Alternative Metal", "Alternative Punk", "Alternative R&B", "Indie",
            "Indie Folk", "Indie Surf", "Neo-Acoustic", "Neo-Psychedelia",
        ],
    ),
    (
        "Metal",
        &[
            "Metal", "Heavy Metal", "Doom Metal", "Glam Metal", "Gothic Metal",
            "Industrial Metal", "Progressive Metal", "Stoner Metal", "Traditional Doom Metal",
            "Thrash Metal", "Death Metal", "Black Metal", "Power Metal", "Metalcore",
            "Neue Deutsche Härte",
        ],
    ),
    (
        "Punk",
        &[
            "Punk", "Dance-Punk", "Garage Punk", "Post-Punk", "Post-Punk Revival",
            "Punk Blues", "Surf Punk", "Emo", "Hardcore", "Melodic Hardcore", "Post-Hardcore",
            "Midwest Emo", "Ska Punk",
        ],
    ),
    (
        "Blues",
        &[
            "Blues", "British Blues", "Country Blues", "Electric Blues", "Hill Country Blues",
            "Piano Blues", "Delta Blues", "Chicago Blues",
        ],
    ),
    (
        "Jazz",
        &[
            "Jazz", "Jazz Fusion", "Vocal Jazz", "Dixieland", "Bebop", "Cool Jazz",
            "Smooth Jazz", "Acid Jazz", "Swing", "Big Band",
        ],
    ),
    (
        "Country",
        &[
            "Country", "Country Soul", "Progressive Country", "Traditional Country",
            "Americana", "Bluegrass", "Outlaw Country",
        ],
    ),
    (
        "R&B",
        &[
            "R&B", "RnB", "Rhythm & Blues", "Contemporary R&B", "Soul", "Neo Soul",
            "Neo-Soul", "Psychedelic Soul", "Southern Soul", "Smooth Soul", "Blue-Eyed Soul",
            "Motown",
        ],
    ),
    ("Funk", &["Funk", "Synth Funk", "P-Funk"]),
    (
        "Reggae",
        &["Reggae", "Reggae-Pop", "Reggaeton", "Dancehall", "Dub", "Ska", "Rocksteady"],
    ),
    (
        "Folk",
        &["Folk", "Contemporary Folk", "Folk Pop", "Stomp And Holler", "Traditional Folk"],
    ),
    (
        "Classical",
        &[
            "Classical", "Modern Classical", "Cinematic Classical", "Opera", "Orchestral",
            "Symphonic Prog", "Baroque", "Romantic", "Chamber Music", "Soundtrack", "Score",
        ],
    ),
    (
        "World",
        &[
            "World", "Asian Music", "Brazilian Music", "Latin", "Latin Music", "Afrobeat",
            "Afrobeats", "Soukous", "Salsa", "Plena", "Schlager", "Bossa Nova", "Flamenco",
        ],
    ),
    ("Gospel", &["Gospel", "Contemporary Gospel", "Southern Gospel", "Christian"]),
    (
        "Ambient",
        &[
            "Ambient", "Ambient Dub", "Space Ambient", "Experimental", "Avant-Garde",
            "Slowcore", "Drone", "New Age",
        ],
    ),
    ("Singer-Songwriter", &["Singer-Songwriter", "Singer & Songwriter"]),
    ("New Wave", &["New Wave", "New Romantic", "Minimal Synth", "Darkwave"]),
    ("Disco", &["Disco", "Nu-Disco", "Italo Disco"]),
    (
        "Rockabilly",
        &["Rockabilly", "Rock And Roll", "Rock & Roll", "Rock & Roll/Rockabilly"],
    ),
    ("Industrial", &["Industrial", "Industrial Rock", "Electro-Industrial", "EBM"]),
    ("Shoegaze", &["Shoegaze", "Nu Gaze"]),
    ("Lounge", &["Lounge", "Easy Listening", "Exotica"]),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalGenre {
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CanonicalGenre {
    pub fn new(name: &str, genres: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            genres: genres.iter().map(|genre| genre.to_string()).collect(),
        }
    }

    pub fn playlist_name(&self) -> String {
        format!("{} Radio", self.name)
    }
}

pub fn default_groups() -> Vec<CanonicalGenre> {
    DEFAULT_GENRE_GROUPS
        .iter()
        .map(|(name, genres)| CanonicalGenre::new(name, genres))
        .collect()
}

#[derive(Clone, Debug)]
pub struct GenreNormalizer {
    groups: Vec<CanonicalGenre>,
    lookup: HashMap<String, usize>,
    delimiter: char,
    grouping: bool,
}

impl GenreNormalizer {
    pub fn new(groups: Vec<CanonicalGenre>, delimiter: char) -> Self {
        let mut lookup = HashMap::new();
        for (idx, group) in groups.iter().enumerate() {
            let names = std::iter::once(&group.name).chain(group.genres.iter());
            for name in names {
                let key = name.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                lookup.entry(key).or_insert(idx);
            }
        }
        Self {
            groups,
            lookup,
            delimiter,
            grouping: true,
        }
    }

    pub fn with_default_table() -> Self {
        Self::new(default_groups(), DEFAULT_DELIMITER)
    }

    /// Every trimmed token becomes its own group.
    pub fn ungrouped(delimiter: char) -> Self {
        Self {
            groups: Vec::new(),
            lookup: HashMap::new(),
            delimiter,
            grouping: false,
        }
    }

    pub fn groups(&self) -> &[CanonicalGenre] {
        &self.groups
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn map_token(&self, token: &str) -> String {
        let token = token.trim();
        if token.is_empty() {
            return OTHER_GENRE.to_string();
        }
        if !self.grouping {
            return token.to_string();
        }
        match self.lookup.get(&token.to_lowercase()) {
            Some(idx) => self.groups[*idx].name.clone(),
            None => OTHER_GENRE.to_string(),
        }
    }

    /// Maps one raw genre field. The result is never empty.
    pub fn normalize(&self, raw: &str) -> BTreeSet<String> {
        self.normalize_all(std::iter::once(raw))
    }

    pub fn normalize_all<'a, I>(&self, fields: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = BTreeSet::new();
        for field in fields {
            for token in field.split(self.delimiter) {
                if token.trim().is_empty() {
                    continue;
                }
                out.insert(self.map_token(token));
            }
        }
        if out.is_empty() {
            out.insert(OTHER_GENRE.to_string());
        }
        out
    }
}

impl Default for GenreNormalizer {
    fn default() -> Self {
        Self::with_default_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: BTreeSet<String>) -> Vec<String> {
        set.into_iter().collect()
    }

    #[test]
    fn subgenres_share_a_group() {
        let normalizer = GenreNormalizer::with_default_table();
        for raw in ["Alternative Rock", "Indie Rock"] {
            let groups = normalizer.normalize(raw);
            assert_eq!(names(groups), vec!["Rock".to_string()]);
        }
        let rock = &normalizer.groups()[0];
        assert_eq!(rock.playlist_name(), "Rock Radio");
    }

    #[test]
    fn splits_on_delimiter_and_routes_unmapped_to_other() {
        let normalizer = GenreNormalizer::new(
            vec![CanonicalGenre::new("Rock", &["Hard Rock", "Alternative Rock"])],
            ';',
        );
        let groups = normalizer.normalize("Hard Rock; Blues Rock");
        assert_eq!(names(groups), vec!["Other".to_string(), "Rock".to_string()]);
    }

    #[test]
    fn default_table_keeps_blues_rock_in_rock() {
        let normalizer = GenreNormalizer::with_default_table();
        let groups = normalizer.normalize("Hard Rock; Blues Rock");
        assert_eq!(names(groups), vec!["Rock".to_string()]);
    }

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        let normalizer = GenreNormalizer::with_default_table();
        assert_eq!(normalizer.map_token("  hip-HOP "), "Hip Hop");
        assert_eq!(normalizer.map_token("JAZZ"), "Jazz");
        assert_eq!(normalizer.map_token("neue deutsche härte"), "Metal");
    }

    #[test]
    fn empty_and_garbage_input_lands_in_other() {
        let normalizer = GenreNormalizer::with_default_table();
        for raw in ["", "   ", ";;", " ; "] {
            assert_eq!(names(normalizer.normalize(raw)), vec!["Other".to_string()]);
        }
        let groups = normalizer.normalize("Vaporwave;Seapunk");
        assert_eq!(names(groups), vec!["Other".to_string()]);
    }

    #[test]
    fn first_listed_group_wins() {
        let normalizer = GenreNormalizer::new(
            vec![
                CanonicalGenre::new("Alpha", &["Shared"]),
                CanonicalGenre::new("Beta", &["Shared", "Only Beta"]),
            ],
            ';',
        );
        assert_eq!(normalizer.map_token("shared"), "Alpha");
        assert_eq!(normalizer.map_token("Only Beta"), "Beta");
        assert_eq!(normalizer.map_token("beta"), "Beta");
    }

    #[test]
    fn ungrouped_keeps_tokens() {
        let normalizer = GenreNormalizer::ungrouped('/');
        let groups = normalizer.normalize("Shoegaze / Dream Pop");
        assert_eq!(
            names(groups),
            vec!["Dream Pop".to_string(), "Shoegaze".to_string()]
        );
    }

    #[test]
    fn merges_multiple_fields() {
        let normalizer = GenreNormalizer::with_default_table();
        let groups = normalizer.normalize_all(["Techno", "Deep House; Soul", "techno"]);
        assert_eq!(
            names(groups),
            vec!["Electronic".to_string(), "R&B".to_string()]
        );
    }
}
