use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An Asana project as returned by `GET /projects`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "gid")]
    pub id: String,
    pub name: String,
    pub resource_type: String,
}

/// An Asana user as returned by `GET /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "gid")]
    pub id: String,
    pub name: String,
    pub resource_type: String,
}

/// The `{"data": [...]}` wrapper used by the API for every collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: Vec<T>,
}

/// Decode an envelope body into its records, preserving their order.
///
/// # Errors
///
/// Returns the decoder error if the body is not valid JSON or the `data`
/// field is missing or malformed.
pub fn decode_envelope<T: DeserializeOwned>(body: &str) -> serde_json::Result<Vec<T>> {
    serde_json::from_str::<Envelope<T>>(body).map(|envelope| envelope.data)
}

/// Projects and users collected during one extraction tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub projects: Vec<Project>,
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_projects() {
        let body = r#"{"data": [
            {"gid": "1", "name": "projname1", "resource_type": "project"},
            {"gid": "2", "name": "projname2", "resource_type": "project", "color": "red"}
        ]}"#;

        let projects: Vec<Project> = decode_envelope(body).unwrap();
        assert_eq!(
            projects,
            vec![
                Project {
                    id: "1".to_string(),
                    name: "projname1".to_string(),
                    resource_type: "project".to_string(),
                },
                Project {
                    id: "2".to_string(),
                    name: "projname2".to_string(),
                    resource_type: "project".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_decode_empty_collection() {
        let users: Vec<User> = decode_envelope(r#"{"data": []}"#).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_data() {
        assert!(decode_envelope::<User>(r#"{"message": "error"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode_envelope::<Project>(r#"{"data": [{"gid": "1""#).is_err());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let user = User {
            id: "100".to_string(),
            name: "username2".to_string(),
            resource_type: "user".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["gid"], "100");
        assert_eq!(json["resource_type"], "user");
    }
}
