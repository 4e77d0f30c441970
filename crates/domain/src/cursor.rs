use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use searchlight_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Keyset pagination cursor.
///
/// Carries the score and entity id of the last returned result plus the id
/// of the persisted query state, so follow-up pages rank with the exact
/// parameters and embedding of the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Score of the last result on the previous page.
    pub score: f64,
    /// Entity id of the last result on the previous page.
    pub id: String,
    /// Identifier of the persisted query state.
    pub query_id: Uuid,
}

impl PageCursor {
    /// Encodes the cursor as URL-safe base64 over its JSON form.
    pub fn encode(&self) -> AppResult<String> {
        let json = serde_json::to_vec(self).map_err(|error| {
            AppError::Internal(format!("failed to serialize pagination cursor: {error}"))
        })?;
        Ok(URL_SAFE.encode(json))
    }

    /// Decodes a cursor produced by [`PageCursor::encode`].
    pub fn decode(cursor: &str) -> AppResult<Self> {
        let bytes = URL_SAFE
            .decode(cursor)
            .map_err(|error| AppError::InvalidCursor(format!("malformed base64: {error}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|error| AppError::InvalidCursor(format!("malformed payload: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::PageCursor;

    #[test]
    fn decode_rejects_garbage() {
        assert!(PageCursor::decode("not base64 at all!").is_err());
        assert!(PageCursor::decode("aGVsbG8=").is_err());
    }

    #[test]
    fn encode_decode_round_trip() {
        let cursor = PageCursor {
            score: 0.734_210_581_201,
            id: "c0ffee00-0000-4000-8000-000000000001".to_owned(),
            query_id: Uuid::nil(),
        };

        let encoded = cursor.encode();
        assert!(
            encoded.is_ok_and(|encoded| PageCursor::decode(&encoded)
                .is_ok_and(|decoded| decoded == cursor))
        );
    }

    proptest! {
        #[test]
        fn round_trips_any_finite_score(score in proptest::num::f64::NORMAL, id in "[a-z0-9-]{1,64}") {
            let cursor = PageCursor {
                score,
                id,
                query_id: Uuid::nil(),
            };

            let encoded = cursor.encode();
            prop_assert!(encoded.is_ok_and(|encoded| PageCursor::decode(&encoded)
                .is_ok_and(|decoded| decoded == cursor)));
        }
    }
}
