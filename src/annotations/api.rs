//! Remote annotation service.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::{Annotation, AnnotationPatch, NewAnnotation};

/// Operations the store needs from the service holding the authoritative
/// copy of a book's annotations.
pub trait AnnotationApi: Send + Sync {
    fn list(&self, book_id: &str) -> Result<Vec<Annotation>, ApiError>;
    fn create(&self, annotation: &NewAnnotation) -> Result<Annotation, ApiError>;
    fn update(&self, id: &str, patch: &AnnotationPatch) -> Result<Annotation, ApiError>;
    fn delete(&self, id: &str) -> Result<(), ApiError>;
}

/// `GET/POST/PUT/DELETE {base}/annotations[/{id}]` over blocking HTTP.
pub struct HttpAnnotationApi {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<Annotation>),
    Wrapped { annotations: Vec<Annotation> },
}

impl HttpAnnotationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut builder = Client::builder().timeout(timeout).user_agent("folio");
        if base_url.starts_with("http://127.0.0.1") || base_url.starts_with("http://localhost") {
            builder = builder.no_proxy();
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn collection_url(&self) -> String {
        format!("{}/annotations", self.base_url)
    }

    pub fn item_url(&self, id: &str) -> Result<String, ApiError> {
        let mut url = reqwest::Url::parse(&self.collection_url())
            .map_err(|err| ApiError::Decode(format!("invalid base url: {}", err)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Decode("base url cannot hold a path".to_string()))?
            .push(id);
        Ok(url.to_string())
    }

    fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status(status.as_u16()))
        }
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        Self::check(response)?
            .json()
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

impl AnnotationApi for HttpAnnotationApi {
    fn list(&self, book_id: &str) -> Result<Vec<Annotation>, ApiError> {
        let response = self
            .client
            .get(self.collection_url())
            .query(&[("book", book_id)])
            .send()?;
        Ok(match Self::decode::<ListResponse>(response)? {
            ListResponse::Bare(list) => list,
            ListResponse::Wrapped { annotations } => annotations,
        })
    }

    fn create(&self, annotation: &NewAnnotation) -> Result<Annotation, ApiError> {
        let response = self
            .client
            .post(self.collection_url())
            .json(annotation)
            .send()?;
        Self::decode(response)
    }

    fn update(&self, id: &str, patch: &AnnotationPatch) -> Result<Annotation, ApiError> {
        let response = self.client.put(self.item_url(id)?).json(patch).send()?;
        Self::decode(response)
    }

    fn delete(&self, id: &str) -> Result<(), ApiError> {
        let response = self.client.delete(self.item_url(id)?).send()?;
        Self::check(response)?;
        Ok(())
    }
}
