use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::models::{
    Album, CachedUrl, CreateAlbumRequest, CreateGroupRequest, Group, Image, ImageFilter,
    ImageQuery, Person, RegisterImageRequest, SortKey, User, Visibility,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // Policy is kept as the raw text a database column would hold.
    groups: HashMap<Uuid, (Group, String)>,
    images: HashMap<Uuid, Image>,
    persons: HashMap<Uuid, Person>,
    image_persons: BTreeSet<(Uuid, Uuid)>,
    albums: HashMap<Uuid, Album>,
    album_images: BTreeSet<(Uuid, Uuid)>,
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory, mirroring the ordering and
/// filtering rules of `PostgresRepository`. Used by the test suites and for
/// running the API without a database. Counters expose how often the access
/// policy was read and how often signed URLs were written.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    visibility_reads: AtomicUsize,
    url_writes: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> RepoResult<MutexGuard<'_, Tables>> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory store switched to failure mode".to_string(),
            ));
        }
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
    }

    /// When set, every subsequent operation fails with `RepositoryError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    pub fn visibility_reads(&self) -> usize {
        self.visibility_reads.load(AtomicOrdering::SeqCst)
    }

    pub fn url_writes(&self) -> usize {
        self.url_writes.load(AtomicOrdering::SeqCst)
    }

    // --- Seeding ---

    pub fn insert_user(&self, user: User) {
        if let Ok(mut tables) = self.tables() {
            tables.users.insert(user.id, user);
        }
    }

    /// Stores a group with a raw policy string, as an external writer could.
    pub fn insert_group_with_policy(&self, id: Uuid, owner_id: Uuid, policy: &str) -> Group {
        let group = Group {
            id,
            name: format!("group-{}", id.simple()),
            visibility: Visibility::from_policy(policy),
            owner_id,
            created_at: Utc::now(),
        };
        if let Ok(mut tables) = self.tables() {
            tables.groups.insert(id, (group.clone(), policy.to_string()));
        }
        group
    }

    pub fn insert_image(&self, image: Image) {
        if let Ok(mut tables) = self.tables() {
            tables.images.insert(image.id, image);
        }
    }

    pub fn insert_person(&self, person: Person) {
        if let Ok(mut tables) = self.tables() {
            tables.persons.insert(person.id, person);
        }
    }

    /// Links an image to a detected person, as the face pipeline does.
    pub fn tag_person(&self, image_id: Uuid, person_id: Uuid) {
        if let Ok(mut tables) = self.tables() {
            tables.image_persons.insert((image_id, person_id));
        }
    }

    /// Current stored state of an image, bypassing the failure switch.
    pub fn image(&self, image_id: Uuid) -> Option<Image> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.images.get(&image_id).cloned())
    }
}

fn compare_images(sort: SortKey, a: &Image, b: &Image) -> Ordering {
    let primary = match sort {
        SortKey::UploadedDesc => b.uploaded_at.cmp(&a.uploaded_at),
        // None orders below Some, so a descending compare puts NULLs last.
        SortKey::TakenDesc => b.taken_at.cmp(&a.taken_at),
        SortKey::FilenameAsc => a.filename.cmp(&b.filename),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn window<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.into_iter().skip(offset).take(limit).collect()
}

fn person_with_count(tables: &Tables, person: &Person) -> Person {
    let image_count = tables
        .image_persons
        .iter()
        .filter(|(_, person_id)| *person_id == person.id)
        .count() as i64;
    Person {
        image_count,
        ..person.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn create_group(&self, req: CreateGroupRequest, owner_id: Uuid) -> RepoResult<Group> {
        let group = Group {
            id: Uuid::new_v4(),
            name: req.name,
            visibility: req.access,
            owner_id,
            created_at: Utc::now(),
        };
        self.tables()?
            .groups
            .insert(group.id, (group.clone(), req.access.as_str().to_string()));
        Ok(group)
    }

    async fn get_group(&self, id: Uuid) -> RepoResult<Option<Group>> {
        Ok(self.tables()?.groups.get(&id).map(|(group, _)| group.clone()))
    }

    async fn get_group_visibility(&self, id: Uuid) -> RepoResult<Option<Visibility>> {
        self.visibility_reads.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self
            .tables()?
            .groups
            .get(&id)
            .map(|(_, policy)| Visibility::from_policy(policy)))
    }

    async fn set_group_visibility(
        &self,
        id: Uuid,
        owner_id: Uuid,
        visibility: Visibility,
    ) -> RepoResult<Option<Group>> {
        let mut tables = self.tables()?;
        Ok(match tables.groups.get_mut(&id) {
            Some((group, policy)) if group.owner_id == owner_id => {
                group.visibility = visibility;
                *policy = visibility.as_str().to_string();
                Some(group.clone())
            }
            _ => None,
        })
    }

    async fn get_owned_groups(&self, owner_id: Uuid) -> RepoResult<Vec<Group>> {
        let tables = self.tables()?;
        let mut groups: Vec<Group> = tables
            .groups
            .values()
            .map(|(group, _)| group)
            .filter(|group| group.owner_id == owner_id)
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn create_image(&self, req: RegisterImageRequest) -> RepoResult<Image> {
        let image = Image {
            id: Uuid::new_v4(),
            group_id: req.group_id,
            filename: req.filename,
            storage_key: req.storage_key,
            cached_url: None,
            thumbnail_key: None,
            size_bytes: req.size_bytes,
            taken_at: req.taken_at,
            uploaded_at: Utc::now(),
        };
        self.tables()?.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn get_image(&self, group_id: Uuid, image_id: Uuid) -> RepoResult<Option<Image>> {
        Ok(self
            .tables()?
            .images
            .get(&image_id)
            .filter(|image| image.group_id == group_id)
            .cloned())
    }

    async fn list_images(&self, query: &ImageQuery) -> RepoResult<Vec<Image>> {
        let tables = self.tables()?;
        let mut rows: Vec<Image> = tables
            .images
            .values()
            .filter(|image| image.group_id == query.group_id)
            .filter(|image| match query.filter {
                ImageFilter::All => true,
                ImageFilter::Person(person_id) => {
                    tables.image_persons.contains(&(image.id, person_id))
                }
                ImageFilter::Album(album_id) => tables.album_images.contains(&(album_id, image.id)),
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_images(query.sort, a, b));
        Ok(window(rows, query.limit, query.offset))
    }

    async fn set_image_url(
        &self,
        image_id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut tables = self.tables()?;
        if let Some(image) = tables.images.get_mut(&image_id) {
            image.cached_url = Some(CachedUrl {
                url: url.to_string(),
                expires_at,
            });
        }
        self.url_writes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn set_image_thumbnail(
        &self,
        group_id: Uuid,
        image_id: Uuid,
        thumbnail_key: &str,
    ) -> RepoResult<bool> {
        let mut tables = self.tables()?;
        Ok(match tables.images.get_mut(&image_id) {
            Some(image) if image.group_id == group_id => {
                image.thumbnail_key = Some(thumbnail_key.to_string());
                true
            }
            _ => false,
        })
    }

    async fn get_person(&self, group_id: Uuid, person_id: Uuid) -> RepoResult<Option<Person>> {
        let tables = self.tables()?;
        Ok(tables
            .persons
            .get(&person_id)
            .filter(|person| person.group_id == group_id)
            .map(|person| person_with_count(&tables, person)))
    }

    async fn list_persons(
        &self,
        group_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Person>> {
        let tables = self.tables()?;
        let mut rows: Vec<Person> = tables
            .persons
            .values()
            .filter(|person| person.group_id == group_id)
            .map(|person| person_with_count(&tables, person))
            .collect();
        rows.sort_by(|a, b| {
            b.image_count
                .cmp(&a.image_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(window(rows, limit, offset))
    }

    async fn create_album(
        &self,
        group_id: Uuid,
        req: CreateAlbumRequest,
        user_id: Uuid,
    ) -> RepoResult<Album> {
        let album = Album {
            id: Uuid::new_v4(),
            group_id,
            name: req.name,
            created_by: user_id,
            created_at: Utc::now(),
            image_count: 0,
        };
        self.tables()?.albums.insert(album.id, album.clone());
        Ok(album)
    }

    async fn get_album(&self, album_id: Uuid) -> RepoResult<Option<Album>> {
        let tables = self.tables()?;
        Ok(tables.albums.get(&album_id).map(|album| Album {
            image_count: tables
                .album_images
                .iter()
                .filter(|(id, _)| *id == album_id)
                .count() as i64,
            ..album.clone()
        }))
    }

    async fn list_albums(&self, group_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<Album>> {
        let tables = self.tables()?;
        let mut rows: Vec<Album> = tables
            .albums
            .values()
            .filter(|album| album.group_id == group_id)
            .map(|album| Album {
                image_count: tables
                    .album_images
                    .iter()
                    .filter(|(album_id, _)| *album_id == album.id)
                    .count() as i64,
                ..album.clone()
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(window(rows, limit, offset))
    }

    async fn add_image_to_album(&self, album_id: Uuid, image_id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables()?;
        let same_group = match (tables.albums.get(&album_id), tables.images.get(&image_id)) {
            (Some(album), Some(image)) => album.group_id == image.group_id,
            _ => false,
        };
        if same_group {
            tables.album_images.insert((album_id, image_id));
        }
        Ok(same_group)
    }
}
