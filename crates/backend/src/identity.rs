use serde::Deserialize;

use crate::api::BackendConfig;

/// Signed-in student as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: StudentIdentity,
}

/// Looks up the signed-in student. Every failure path collapses to `None`;
/// the popup reads that as browsing anonymously.
pub(crate) async fn fetch_identity(
    client: &reqwest::Client,
    config: &BackendConfig,
    session_token: &str,
) -> Option<StudentIdentity> {
    if session_token.trim().is_empty() {
        return None;
    }

    let response = match client
        .get(format!("{}/me", config.auth_base_url))
        .header(
            reqwest::header::AUTHORIZATION,
            urlencoding::encode(session_token).into_owned(),
        )
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(error = %error, "identity lookup failed, treating as signed out");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::debug!(
            status = %response.status(),
            "identity lookup rejected, treating as signed out"
        );
        return None;
    }

    match response.json::<MeResponse>().await {
        Ok(me) => Some(me.user),
        Err(error) => {
            tracing::debug!(error = %error, "identity payload unreadable, treating as signed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_payload_parses_with_optional_names() {
        let me: MeResponse =
            serde_json::from_str(r#"{"user":{"email":"s@example.com","firstName":"Ada"}}"#)
                .unwrap();
        assert_eq!(me.user.email, "s@example.com");
        assert_eq!(me.user.first_name.as_deref(), Some("Ada"));
        assert_eq!(me.user.last_name, None);
    }

    #[test]
    fn identity_payload_ignores_extra_fields() {
        let me: MeResponse = serde_json::from_str(
            r#"{"user":{"email":"s@example.com","lastName":"Byron","plan":"pro"}}"#,
        )
        .unwrap();
        assert_eq!(me.user.last_name.as_deref(), Some("Byron"));
    }
}
