// Record shapes used by the sample databases: a games table, a table of
// famous programmers, and the Artist -> Album -> Track chain from Chinook.

use crate::core::repository::Entity;
use crate::db::{Field, Record, Schema};
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: Option<i64>,
    pub name: String,
    pub genre: Option<String>,
    pub release: Option<NaiveDate>,
    pub publisher: Option<String>,
    pub metacritic_score: Option<f64>,
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            genre: None,
            release: None,
            publisher: None,
            metacritic_score: None,
        }
    }
}

impl Entity for Game {
    fn schema() -> Schema {
        Schema::new("Games", "id")
            .field(Field::text("name").required())
            .field(Field::text("genre"))
            .field(Field::date("release"))
            .field(Field::text("publisher"))
            .field(Field::real("metacritic_score"))
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        let record = Record::new("Games")
            .with("name", &self.name)
            .with("genre", self.genre.clone())
            .with("release", self.release)
            .with("publisher", self.publisher.clone())
            .with("metacritic_score", self.metacritic_score);
        with_key(record, self.id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.id(),
            name: record.text("name")?,
            genre: record.opt_text("genre")?,
            release: record.opt_date("release")?,
            publisher: record.opt_text("publisher")?,
            metacritic_score: record.opt_real("metacritic_score")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Programmer {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub nationality: String,
    pub famous_for: String,
}

impl Programmer {
    pub fn new(
        first_name: &str,
        last_name: &str,
        gender: &str,
        nationality: &str,
        famous_for: &str,
    ) -> Self {
        Self {
            id: None,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            gender: gender.to_string(),
            nationality: nationality.to_string(),
            famous_for: famous_for.to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for Programmer {
    fn schema() -> Schema {
        Schema::new("Programmer", "id")
            .field(Field::text("first_name").required())
            .field(Field::text("last_name").required())
            .field(Field::text("gender"))
            .field(Field::text("nationality"))
            .field(Field::text("famous_for"))
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        let record = Record::new("Programmer")
            .with("first_name", &self.first_name)
            .with("last_name", &self.last_name)
            .with("gender", &self.gender)
            .with("nationality", &self.nationality)
            .with("famous_for", &self.famous_for);
        with_key(record, self.id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.id(),
            first_name: record.text("first_name")?,
            last_name: record.text("last_name")?,
            gender: record.opt_text("gender")?.unwrap_or_default(),
            nationality: record.opt_text("nationality")?.unwrap_or_default(),
            famous_for: record.opt_text("famous_for")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub artist_id: Option<i64>,
    pub name: Option<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            artist_id: None,
            name: Some(name.into()),
        }
    }
}

impl Entity for Artist {
    fn schema() -> Schema {
        Schema::new("Artist", "ArtistId").field(Field::text("Name"))
    }

    fn id(&self) -> Option<i64> {
        self.artist_id
    }

    fn set_id(&mut self, id: i64) {
        self.artist_id = Some(id);
    }

    fn to_record(&self) -> Record {
        with_key(Record::new("Artist").with("Name", self.name.clone()), self.artist_id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            artist_id: record.id(),
            name: record.opt_text("Name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub album_id: Option<i64>,
    pub title: String,
    pub artist_id: i64,
}

impl Album {
    pub fn new(title: impl Into<String>, artist_id: i64) -> Self {
        Self {
            album_id: None,
            title: title.into(),
            artist_id,
        }
    }
}

impl Entity for Album {
    fn schema() -> Schema {
        Schema::new("Album", "AlbumId")
            .field(Field::text("Title").required())
            .field(Field::integer("ArtistId").required().references("Artist", "ArtistId"))
    }

    fn id(&self) -> Option<i64> {
        self.album_id
    }

    fn set_id(&mut self, id: i64) {
        self.album_id = Some(id);
    }

    fn to_record(&self) -> Record {
        let record = Record::new("Album")
            .with("Title", &self.title)
            .with("ArtistId", self.artist_id);
        with_key(record, self.album_id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            album_id: record.id(),
            title: record.text("Title")?,
            artist_id: record.integer("ArtistId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: Option<i64>,
    pub name: String,
    pub album_id: Option<i64>,
    pub media_type_id: i64,
    pub genre_id: Option<i64>,
    pub composer: Option<String>,
    pub milliseconds: i64,
    pub bytes: Option<i64>,
    pub unit_price: f64,
}

impl Entity for Track {
    fn schema() -> Schema {
        // MediaType and Genre tables are not modelled, so those ids are plain integers.
        Schema::new("Track", "TrackId")
            .field(Field::text("Name").required())
            .field(Field::integer("AlbumId").references("Album", "AlbumId"))
            .field(Field::integer("MediaTypeId").required())
            .field(Field::integer("GenreId"))
            .field(Field::text("Composer"))
            .field(Field::integer("Milliseconds").required())
            .field(Field::integer("Bytes"))
            .field(Field::real("UnitPrice").required())
    }

    fn id(&self) -> Option<i64> {
        self.track_id
    }

    fn set_id(&mut self, id: i64) {
        self.track_id = Some(id);
    }

    fn to_record(&self) -> Record {
        let record = Record::new("Track")
            .with("Name", &self.name)
            .with("AlbumId", self.album_id)
            .with("MediaTypeId", self.media_type_id)
            .with("GenreId", self.genre_id)
            .with("Composer", self.composer.clone())
            .with("Milliseconds", self.milliseconds)
            .with("Bytes", self.bytes)
            .with("UnitPrice", self.unit_price);
        with_key(record, self.track_id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            track_id: record.id(),
            name: record.text("Name")?,
            album_id: record.opt_integer("AlbumId")?,
            media_type_id: record.integer("MediaTypeId")?,
            genre_id: record.opt_integer("GenreId")?,
            composer: record.opt_text("Composer")?,
            milliseconds: record.integer("Milliseconds")?,
            bytes: record.opt_integer("Bytes")?,
            unit_price: record.real("UnitPrice")?,
        })
    }
}

fn with_key(record: Record, id: Option<i64>) -> Record {
    match id {
        Some(id) => record.with_id(id),
        None => record,
    }
}
