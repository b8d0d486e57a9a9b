use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::common::{ChatMessage, MessageOrigin, Room, Session, WireMessage};
use crate::error::FetchError;

use super::backoff::Backoff;

const ROOMS_PATH: &str = "/chat/rooms";
const MESSAGES_PATH: &str = "/chat/messages";

/// REST client for the room list and paginated message history.
#[derive(Debug, Clone)]
pub struct HistoryFetcher {
    http: reqwest::Client,
    base_url: Url,
    retry: Backoff,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomList {
    Bare(Vec<Room>),
    Wrapped { data: Vec<Room> },
}

impl HistoryFetcher {
    pub fn new(
        base_url: Url,
        request_timeout: Duration,
        retry: Backoff,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(FetchError::Network)?;
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    pub fn with_client(http: reqwest::Client, base_url: Url, retry: Backoff) -> Self {
        Self {
            http,
            base_url,
            retry,
        }
    }

    /// Fetches one page of a room's history, oldest first as the server orders it.
    ///
    /// Never returns more than `page_size` messages. Each message is tagged as
    /// own/other against `session`.
    pub async fn fetch(
        &self,
        room_uuid: &str,
        page: u32,
        page_size: u32,
        session: &Session,
    ) -> Result<Vec<ChatMessage>, FetchError> {
        if page_size == 0 {
            return Err(FetchError::InvalidPageSize);
        }

        let url = self.endpoint(MESSAGES_PATH)?;
        let query = [
            ("roomUUID", room_uuid.to_string()),
            ("page", page.to_string()),
            ("size", page_size.to_string()),
        ];
        let result = self
            .get_json::<MessagePage>("fetch messages", &url, &query)
            .await;

        let page_body = match result {
            Ok(page_body) => page_body,
            Err(err) => {
                log::error!("Error fetching chat messages for room {room_uuid}: {err}");
                return Err(err);
            }
        };

        let mut records = decode_records(page_body.data);
        if records.len() > page_size as usize {
            log::warn!(
                "Server returned {} messages for a page of {page_size}; truncating",
                records.len()
            );
            records.truncate(page_size as usize);
        }

        log::debug!(
            "Fetched {} messages for room {room_uuid} (page {page})",
            records.len()
        );

        Ok(records
            .into_iter()
            .map(|record| ChatMessage::from_wire(record, MessageOrigin::History, session))
            .collect())
    }

    pub async fn fetch_rooms(&self) -> Result<Vec<Room>, FetchError> {
        let url = self.endpoint(ROOMS_PATH)?;
        let result = self.get_json::<RoomList>("fetch rooms", &url, &[]).await;

        match result {
            Ok(RoomList::Bare(rooms) | RoomList::Wrapped { data: rooms }) => {
                log::info!("Fetched {} chat rooms", rooms.len());
                Ok(rooms)
            }
            Err(err) => {
                log::error!("Error fetching chat list: {err}");
                Err(err)
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|err| FetchError::InvalidUrl(format!("{}{path}: {err}", self.base_url)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.get_once(url, query).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.retry.allows(attempts) => {
                    let delay = self.retry.delay(attempts);
                    log::warn!("{what} failed (attempt {attempts}): {err}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// `data` that is missing or not an array is an empty page; unreadable entries are skipped.
fn decode_records(data: serde_json::Value) -> Vec<WireMessage> {
    let serde_json::Value::Array(entries) = data else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<WireMessage>(entry) {
            Ok(record) => Some(record),
            Err(err) => {
                log::warn!("Skipping unreadable history entry: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HistoryFetcher {
        HistoryFetcher::with_client(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            Backoff::none(),
        )
    }

    #[tokio::test]
    async fn zero_page_size_fails_before_any_request() {
        let session = Session::new("pjh2", "");
        let err = fetcher().fetch("room-1", 0, 0, &session).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidPageSize));
    }

    #[test]
    fn non_array_data_is_an_empty_page() {
        assert!(decode_records(serde_json::Value::Null).is_empty());
        assert!(decode_records(serde_json::json!({"oops": 1})).is_empty());
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let records = decode_records(serde_json::json!([
            {"id": 1, "username": "pjh1", "message": "a"},
            "not a message",
            {"id": 2, "username": "pjh2", "message": "b"}
        ]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn room_list_accepts_both_shapes() {
        let bare: RoomList =
            serde_json::from_str(r#"[{"uuid": "r1", "name": "General"}]"#).unwrap();
        let wrapped: RoomList =
            serde_json::from_str(r#"{"data": [{"uuid": "r1", "name": "General"}]}"#).unwrap();
        for list in [bare, wrapped] {
            let (RoomList::Bare(rooms) | RoomList::Wrapped { data: rooms }) = list;
            assert_eq!(rooms, vec![Room::new("r1", "General")]);
        }
    }
}
