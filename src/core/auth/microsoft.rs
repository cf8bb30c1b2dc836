// ─── Microsoft Authentication Chain ───
// Device code → Microsoft tokens → Xbox Live → XSTS → Minecraft token →
// entitlement → profile. Every step deserializes into either the success
// shape or the endpoint's error shape.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::core::error::{AuthenticationError, LauncherResult};
use crate::debug_if;

const CLIENT_ID: (&str, &str) = ("client_id", "94fd28d0-faa6-4d85-920d-69a2abe16bcd");
const SCOPE: (&str, &str) = ("scope", "XboxLive.signin offline_access");
const DEVICE_CODE_GRANT: (&str, &str) = (
    "grant_type",
    "urn:ietf:params:oauth:grant-type:device_code",
);

const DEVICE_CODE_URL: &str =
    "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const XBOX_LIVE_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTH_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MINECRAFT_AUTH_URL: &str =
    "https://api.minecraftservices.com/authentication/login_with_xbox";
const MINECRAFT_ENTITLEMENT_URL: &str =
    "https://api.minecraftservices.com/entitlements/mcstore";
const MINECRAFT_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

/// Shown when the profile has no active skin.
pub const DEFAULT_SKIN_URL: &str =
    "http://textures.minecraft.net/texture/31f477eb1a7beee631c2ca64d06f8f68fa93a3386d04452ab27f43acdf1b60cb";

type AuthResult<T> = Result<T, AuthenticationError>;

/// Everything the launcher needs to persist or hold for a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub uuid: String,
    pub name: String,
    pub skin_url: String,
    pub xbox_uhs: String,
    pub microsoft_refresh_token: String,
    pub minecraft_access_token: String,
    /// Unix seconds.
    pub minecraft_access_token_expiry: u64,
}

// ─── Device code flow ───

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeGrant {
    pub user_code: String,
    pub device_code: String,
    pub verification_uri: String,
    /// Seconds the code stays valid.
    pub expires_in: u64,
    /// Server-mandated polling interval in seconds.
    pub interval: u64,
    /// Ready-to-display instruction text.
    pub message: String,
}

/// Kick off the device-code flow; the UI shows `user_code` /
/// `verification_uri` while the engine polls.
pub async fn start_device_code_flow(client: &Client) -> AuthResult<DeviceCodeGrant> {
    info!("Requesting Microsoft device code");
    let response = client
        .get(DEVICE_CODE_URL)
        .query(&[CLIENT_ID, SCOPE])
        .send()
        .await?;
    let grant: DeviceCodeGrant =
        response_or_error::<_, MicrosoftErrorResponse>(response, DEVICE_CODE_URL).await?;
    debug_if!(
        "AUTHENTICATION",
        "Device code '{}', user code '{}'",
        grant.device_code,
        grant.user_code
    );
    Ok(grant)
}

/// Poll the token endpoint until the user finishes the web flow, honoring
/// `authorization_pending` / `slow_down`, and give up once the grant
/// expires.
pub async fn poll_device_code(
    client: &Client,
    device_code: &str,
    mut interval_seconds: u64,
    expires_in: u64,
) -> AuthResult<AuthenticatedAccount> {
    let deadline = Utc::now().timestamp() as u64 + expires_in;
    info!("Polling device code endpoint every {}s", interval_seconds);

    let tokens = loop {
        if Utc::now().timestamp() as u64 >= deadline {
            return Err(AuthenticationError::DeviceCodeExpired);
        }
        tokio::time::sleep(Duration::from_secs(interval_seconds.max(1))).await;

        let form: HashMap<&str, &str> = HashMap::from([
            CLIENT_ID,
            DEVICE_CODE_GRANT,
            ("device_code", device_code),
        ]);
        let response = client.post(TOKEN_URL).form(&form).send().await?;

        if response.status().is_success() {
            break response.json::<MicrosoftTokenResponse>().await?;
        }

        let error: MicrosoftErrorResponse = response.json().await?;
        match error.error.as_str() {
            "authorization_pending" => {
                debug_if!("AUTHENTICATION", "Authorization pending, polling again");
            }
            "slow_down" => {
                interval_seconds += 5;
                debug!("Server asked to slow down, interval now {}s", interval_seconds);
            }
            "expired_token" => return Err(AuthenticationError::DeviceCodeExpired),
            _ => return Err(error.into()),
        }
    };

    continue_authentication_chain(client, tokens).await
}

/// Re-run the chain from a stored refresh token. A rejected token maps to
/// the dedicated `RefreshRejected` subkind so the UI can demand a fresh
/// sign-in.
pub async fn refresh_account(
    client: &Client,
    refresh_token: &str,
) -> AuthResult<AuthenticatedAccount> {
    info!("Refreshing Microsoft tokens");
    let form: HashMap<&str, &str> = HashMap::from([
        CLIENT_ID,
        SCOPE,
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ]);
    let response = client.post(TOKEN_URL).form(&form).send().await?;

    if !response.status().is_success() {
        let error: MicrosoftErrorResponse = response.json().await?;
        return match error.error.as_str() {
            "invalid_grant" => Err(AuthenticationError::RefreshRejected),
            _ => Err(error.into()),
        };
    }

    let tokens = response.json::<MicrosoftTokenResponse>().await?;
    continue_authentication_chain(client, tokens).await
}

// ─── Xbox Live / XSTS / Minecraft ───

async fn continue_authentication_chain(
    client: &Client,
    microsoft: MicrosoftTokenResponse,
) -> AuthResult<AuthenticatedAccount> {
    debug!("Requesting Xbox Live token");
    let xbl = get_xbl_token(client, &microsoft.access_token).await?;
    debug_if!("AUTHENTICATION", "XBL token '{}'", xbl.token);

    debug!("Requesting XSTS token");
    let xsts = get_xsts_token(client, &xbl.token).await?;
    let user_hash = xsts
        .user_hash()
        .ok_or(AuthenticationError::MissingUserHash)?;

    debug!("Requesting Minecraft token");
    let minecraft = get_minecraft_token(client, &xsts.token, &user_hash).await?;
    debug_if!(
        "AUTHENTICATION",
        "Minecraft token '{}'",
        minecraft.access_token
    );

    debug!("Checking Minecraft entitlement");
    check_entitlement(client, &minecraft.access_token).await?;

    debug!("Fetching Minecraft profile");
    let profile = get_minecraft_profile(client, &minecraft.access_token).await?;
    info!("Authenticated as {}", profile.name);

    let expiry = Utc::now().timestamp() as u64 + minecraft.expires_in.saturating_sub(10);
    Ok(AuthenticatedAccount {
        skin_url: profile.active_skin_url(),
        uuid: profile.id,
        name: profile.name,
        xbox_uhs: user_hash,
        microsoft_refresh_token: microsoft.refresh_token,
        minecraft_access_token: minecraft.access_token,
        minecraft_access_token_expiry: expiry,
    })
}

async fn get_xbl_token(client: &Client, access_token: &str) -> AuthResult<XboxTokenResponse> {
    let response = client
        .post(XBOX_LIVE_AUTH_URL)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(
            json!({
                "Properties": {
                    "AuthMethod": "RPS",
                    "SiteName": "user.auth.xboxlive.com",
                    "RpsTicket": format!("d={}", access_token)
                },
                "RelyingParty": "http://auth.xboxlive.com",
                "TokenType": "JWT"
            })
            .to_string(),
        )
        .send()
        .await?;
    response_or_error::<_, XboxErrorResponse>(response, XBOX_LIVE_AUTH_URL).await
}

async fn get_xsts_token(client: &Client, xbl_token: &str) -> AuthResult<XboxTokenResponse> {
    let response = client
        .post(XSTS_AUTH_URL)
        .body(
            json!({
                "Properties": {
                    "SandboxId": "RETAIL",
                    "UserTokens": [xbl_token]
                },
                "RelyingParty": "rp://api.minecraftservices.com/",
                "TokenType": "JWT"
            })
            .to_string(),
        )
        .send()
        .await?;
    response_or_error::<_, XboxErrorResponse>(response, XSTS_AUTH_URL).await
}

async fn get_minecraft_token(
    client: &Client,
    xsts_token: &str,
    user_hash: &str,
) -> AuthResult<MinecraftTokenResponse> {
    let response = client
        .post(MINECRAFT_AUTH_URL)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(
            json!({
                "identityToken": format!("XBL3.0 x={};{}", user_hash, xsts_token),
                "ensureLegacyEnabled": true
            })
            .to_string(),
        )
        .send()
        .await?;
    response_or_error::<_, MinecraftErrorResponse>(response, MINECRAFT_AUTH_URL).await
}

/// The entitlement endpoint must list the game. Xbox Game Pass users show
/// up with the `_via_subscription` items, which also count.
async fn check_entitlement(client: &Client, access_token: &str) -> AuthResult<()> {
    let response = client
        .get(MINECRAFT_ENTITLEMENT_URL)
        .header("Accept", "application/json")
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await?;
    let store: EntitlementResponse =
        response_or_error::<_, MinecraftErrorResponse>(response, MINECRAFT_ENTITLEMENT_URL)
            .await?;

    let owns_game = store
        .items
        .iter()
        .any(|item| item.name.starts_with("game_minecraft") || item.name.starts_with("product_minecraft"));
    if owns_game {
        Ok(())
    } else {
        Err(AuthenticationError::NoEntitlement)
    }
}

async fn get_minecraft_profile(
    client: &Client,
    access_token: &str,
) -> AuthResult<MinecraftProfileResponse> {
    let response = client
        .get(MINECRAFT_PROFILE_URL)
        .header("Accept", "application/json")
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await?;
    response_or_error::<_, MinecraftProfileErrorResponse>(response, MINECRAFT_PROFILE_URL).await
}

// ─── Response shapes ───

#[derive(Debug, Deserialize)]
struct MicrosoftTokenResponse {
    access_token: String,
    refresh_token: String,
    #[allow(dead_code)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct MicrosoftErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

impl From<MicrosoftErrorResponse> for AuthenticationError {
    fn from(response: MicrosoftErrorResponse) -> Self {
        AuthenticationError::Microsoft {
            error_type: response.error,
            description: response.error_description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct XboxTokenResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: HashMap<String, Vec<HashMap<String, String>>>,
}

impl XboxTokenResponse {
    fn user_hash(&self) -> Option<String> {
        let xui = self.display_claims.get("xui")?;
        xui.first()?.get("uhs").cloned()
    }
}

#[derive(Debug, Deserialize)]
struct XboxErrorResponse {
    #[serde(rename = "XErr")]
    xerr: u32,
    #[serde(rename = "Message", default)]
    message: String,
}

impl From<XboxErrorResponse> for AuthenticationError {
    fn from(response: XboxErrorResponse) -> Self {
        // The XErr codes the UI reacts to get their own subkinds.
        match response.xerr {
            2148916233 => AuthenticationError::NoXboxAccount,
            2148916235 => AuthenticationError::RegionBanned,
            2148916238 => AuthenticationError::ChildAccount,
            xerr => AuthenticationError::Xbox {
                xerr,
                message: response.message,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct MinecraftTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct MinecraftErrorResponse {
    #[serde(default)]
    error: String,
}

impl From<MinecraftErrorResponse> for AuthenticationError {
    fn from(response: MinecraftErrorResponse) -> Self {
        AuthenticationError::Profile {
            error: response.error,
            message: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntitlementResponse {
    #[serde(default)]
    items: Vec<EntitlementItem>,
}

#[derive(Debug, Deserialize)]
struct EntitlementItem {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct MinecraftProfileResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub skins: Vec<MinecraftProfileSkin>,
}

#[derive(Debug, Deserialize)]
pub struct MinecraftProfileSkin {
    pub state: String,
    pub url: String,
}

impl MinecraftProfileResponse {
    /// The active skin's URL, falling back to the classic default texture.
    pub fn active_skin_url(&self) -> String {
        self.skins
            .iter()
            .find(|skin| skin.state == "ACTIVE")
            .or_else(|| self.skins.first())
            .map(|skin| skin.url.clone())
            .unwrap_or_else(|| DEFAULT_SKIN_URL.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct MinecraftProfileErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

impl From<MinecraftProfileErrorResponse> for AuthenticationError {
    fn from(response: MinecraftProfileErrorResponse) -> Self {
        AuthenticationError::Profile {
            error: response.error,
            message: response.error_message,
        }
    }
}

/// Deserialize the success shape on 2xx, the endpoint's error shape
/// otherwise; fall back to a plain HTTP error when the error body is
/// empty.
async fn response_or_error<T, E>(response: Response, url: &str) -> AuthResult<T>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
    AuthenticationError: From<E>,
{
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    match response.content_length() {
        Some(length) if length > 0 => Err(AuthenticationError::from(response.json::<E>().await?)),
        _ => Err(AuthenticationError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// Serializable summary handed to the UI by `start_authentication_flow`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodePrompt {
    pub message: String,
    pub device_code: String,
}

impl From<&DeviceCodeGrant> for DeviceCodePrompt {
    fn from(grant: &DeviceCodeGrant) -> Self {
        Self {
            message: grant.message.clone(),
            device_code: grant.device_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xerr_codes_map_to_typed_subkinds() {
        let banned: AuthenticationError = XboxErrorResponse {
            xerr: 2148916235,
            message: String::new(),
        }
        .into();
        assert!(matches!(banned, AuthenticationError::RegionBanned));

        let child: AuthenticationError = XboxErrorResponse {
            xerr: 2148916238,
            message: String::new(),
        }
        .into();
        assert!(matches!(child, AuthenticationError::ChildAccount));

        let other: AuthenticationError = XboxErrorResponse {
            xerr: 42,
            message: "odd".into(),
        }
        .into();
        assert!(matches!(other, AuthenticationError::Xbox { xerr: 42, .. }));
    }

    #[test]
    fn user_hash_comes_from_display_claims() {
        let response: XboxTokenResponse = serde_json::from_str(
            r#"{
                "IssueInstant": "2026-01-01T00:00:00Z",
                "NotAfter": "2026-01-02T00:00:00Z",
                "Token": "jwt",
                "DisplayClaims": { "xui": [{ "uhs": "123456" }] }
            }"#,
        )
        .unwrap();
        assert_eq!(response.user_hash().as_deref(), Some("123456"));
    }

    #[test]
    fn active_skin_wins_over_first() {
        let profile: MinecraftProfileResponse = serde_json::from_str(
            r#"{
                "id": "069a79f444e94726a5befca90e38aaf5",
                "name": "Steve",
                "skins": [
                    { "id": "a", "state": "INACTIVE", "url": "http://skins/old", "variant": "CLASSIC" },
                    { "id": "b", "state": "ACTIVE", "url": "http://skins/new", "variant": "SLIM" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(profile.active_skin_url(), "http://skins/new");
    }

    #[test]
    fn missing_skins_fall_back_to_default() {
        let profile = MinecraftProfileResponse {
            id: "x".into(),
            name: "y".into(),
            skins: vec![],
        };
        assert_eq!(profile.active_skin_url(), DEFAULT_SKIN_URL);
    }

    #[test]
    fn device_code_grant_parses() {
        let grant: DeviceCodeGrant = serde_json::from_str(
            r#"{
                "user_code": "ABCD1234",
                "device_code": "DEV-xyz",
                "verification_uri": "https://www.microsoft.com/link",
                "expires_in": 900,
                "interval": 5,
                "message": "Go to https://www.microsoft.com/link and enter ABCD1234"
            }"#,
        )
        .unwrap();
        assert_eq!(grant.interval, 5);
        let prompt = DeviceCodePrompt::from(&grant);
        assert_eq!(prompt.device_code, "DEV-xyz");
        assert!(!prompt.message.is_empty());
    }
}
