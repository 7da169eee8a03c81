// API client module: a small blocking HTTP client for the Classroom and
// Drive REST endpoints. The mirror only talks to the two traits below, so
// tests can swap in an in-memory implementation.

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::model::{
    Announcement, AnnouncementPage, Course, CourseWorkMaterial, CourseWorkMaterialPage,
};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::time::Duration;
use url::Url;

pub const CLASSROOM_API_URL: &str = "https://classroom.googleapis.com";
pub const DRIVE_API_URL: &str = "https://www.googleapis.com";

/// Read-only listing calls against a course.
pub trait ClassroomService {
    fn course(&self, id: &str) -> Result<Course>;
    fn announcements(&self, course_id: &str) -> Result<Vec<Announcement>>;
    fn course_work_materials(&self, course_id: &str) -> Result<Vec<CourseWorkMaterial>>;
}

/// Body of a remote file, with its length when the server reports one.
pub struct RemoteContent {
    pub len: Option<u64>,
    pub reader: Box<dyn Read>,
}

/// Binary content retrieval by file id.
pub trait FileSource {
    fn open(&self, file_id: &str) -> Result<RemoteContent>;
}

/// Blocking client holding the base URLs of both APIs and the token
/// source used for every call.
pub struct ApiClient {
    client: Client,
    classroom_url: Url,
    drive_url: Url,
    auth: TokenSource,
}

impl ApiClient {
    /// Create an ApiClient using `CLASSROOM_API_URL` / `DRIVE_API_URL` from
    /// the environment, or the public Google endpoints.
    pub fn from_env(auth: TokenSource) -> Result<Self> {
        let classroom_url =
            std::env::var("CLASSROOM_API_URL").unwrap_or_else(|_| CLASSROOM_API_URL.into());
        let drive_url = std::env::var("DRIVE_API_URL").unwrap_or_else(|_| DRIVE_API_URL.into());
        Self::new(&classroom_url, &drive_url, auth)
    }

    pub fn new(classroom_url: &str, drive_url: &str, auth: TokenSource) -> Result<Self> {
        // Downloads can take longer than reqwest's default 30s total timeout.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;
        Ok(ApiClient {
            client,
            classroom_url: parse_base(classroom_url)?,
            drive_url: parse_base(drive_url)?,
            auth,
        })
    }

    /// The token in use, including any refresh made during the run.
    pub fn token(&self) -> &TokenSource {
        &self.auth
    }

    fn get(&self, url: &Url, query: &[(&str, &str)]) -> Result<Response> {
        tracing::debug!(url = %url, "GET");
        let mut res = self.send(url, query)?;
        if res.status() == StatusCode::UNAUTHORIZED && self.auth.can_refresh() {
            tracing::debug!("access token rejected, refreshing");
            self.auth.refresh()?;
            res = self.send(url, query)?;
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_else(|_| "".into());
            return Err(Error::Api {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(res)
    }

    fn send(&self, url: &Url, query: &[(&str, &str)]) -> Result<Response> {
        Ok(self
            .client
            .get(url.clone())
            .bearer_auth(self.auth.access_token()?)
            .query(query)
            .send()?)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url, query: &[(&str, &str)]) -> Result<T> {
        let res = self.get(url, query)?;
        Ok(res.json()?)
    }

    /// Collect every page of a list endpoint.
    fn list_all<P, T>(&self, url: &Url, split: impl Fn(P) -> (Vec<T>, Option<String>)) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", "100")];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: P = self.get_json(url, &query)?;
            let (mut batch, next) = split(page);
            items.append(&mut batch);
            match next.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }
}

fn parse_base(base: &str) -> Result<Url> {
    let url = Url::parse(base).map_err(|e| Error::BaseUrl(format!("{}: {}", base, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::BaseUrl(base.to_string()));
    }
    Ok(url)
}

/// Append `segments` to the path of `base`. Each segment is percent-encoded,
/// so an id can never add path components or a query.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::BaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl ClassroomService for ApiClient {
    fn course(&self, id: &str) -> Result<Course> {
        let url = endpoint(&self.classroom_url, &["v1", "courses", id])?;
        self.get_json(&url, &[])
    }

    fn announcements(&self, course_id: &str) -> Result<Vec<Announcement>> {
        let url = endpoint(&self.classroom_url, &["v1", "courses", course_id, "announcements"])?;
        self.list_all(&url, |page: AnnouncementPage| {
            (page.announcements, page.next_page_token)
        })
    }

    fn course_work_materials(&self, course_id: &str) -> Result<Vec<CourseWorkMaterial>> {
        let url = endpoint(
            &self.classroom_url,
            &["v1", "courses", course_id, "courseWorkMaterials"],
        )?;
        self.list_all(&url, |page: CourseWorkMaterialPage| {
            (page.course_work_material, page.next_page_token)
        })
    }
}

impl FileSource for ApiClient {
    fn open(&self, file_id: &str) -> Result<RemoteContent> {
        let url = endpoint(&self.drive_url, &["drive", "v3", "files", file_id])?;
        let res = self.get(&url, &[("alt", "media"), ("supportsAllDrives", "true")])?;
        Ok(RemoteContent {
            len: res.content_length(),
            reader: Box::new(res),
        })
    }
}
