// ═══════════════════════════════════════════════════════════════
// AWS Signature Version 4 (SigV4) Signing
// ═══════════════════════════════════════════════════════════════
//
// Signs the form-encoded Query API calls made to CloudFormation and
// SNS. The signature covers:
//   - HTTP method, canonical URI, query string
//   - Sorted headers (host, content-type, x-amz-date, etc.)
//   - SHA-256 hash of the request body
//
// Lambda and other role-based credentials carry a session token;
// when present it is sent and signed as `x-amz-security-token`.
//
// Reference: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Static credentials for one signing call.
#[derive(Clone, Copy)]
pub struct SigningCredentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: Option<&'a str>,
}

/// SHA-256 hash of data, returned as lowercase hex string.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA256 signing.
fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key.
/// key = HMAC("AWS4" + secret, date) → HMAC(_, region) → HMAC(_, service) → HMAC(_, "aws4_request")
fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Host header value: the host plus any non-default port.
fn host_header(url: &Url) -> Result<String, anyhow::Error> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("SigV4: URL has no host"))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Sign a request using AWS Signature Version 4 and inject the
/// `Authorization`, `X-Amz-Date`, `X-Amz-Content-Sha256` and, for
/// session credentials, `X-Amz-Security-Token` headers.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    method: &str,
    url: &str,
    headers: &mut HeaderMap,
    body: &[u8],
    credentials: SigningCredentials<'_>,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let parsed_url = Url::parse(url).map_err(|e| anyhow::anyhow!("SigV4: invalid URL: {}", e))?;
    let canonical_uri = if parsed_url.path().is_empty() {
        "/"
    } else {
        parsed_url.path()
    };

    // Canonical query string (sorted)
    let mut query_pairs: Vec<(String, String)> = parsed_url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    query_pairs.sort();
    let canonical_querystring: String = query_pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let payload_hash = sha256_hex(body);

    headers.insert(
        HeaderName::from_static("x-amz-date"),
        HeaderValue::from_str(&amz_date)?,
    );
    headers.insert(
        HeaderName::from_static("x-amz-content-sha256"),
        HeaderValue::from_str(&payload_hash)?,
    );
    if let Some(token) = credentials.session_token {
        headers.insert(
            HeaderName::from_static("x-amz-security-token"),
            HeaderValue::from_str(token)?,
        );
    }
    headers
        .entry(reqwest::header::HOST)
        .or_insert(HeaderValue::from_str(&host_header(&parsed_url)?)?);

    let mut signed_header_list = vec!["host", "x-amz-content-sha256", "x-amz-date"];
    if headers.contains_key("content-type") {
        signed_header_list.push("content-type");
    }
    if credentials.session_token.is_some() {
        signed_header_list.push("x-amz-security-token");
    }
    signed_header_list.sort();
    let signed_headers = signed_header_list.join(";");

    let mut canonical_headers_str = String::new();
    for &name in &signed_header_list {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        canonical_headers_str.push_str(&format!("{}:{}\n", name, value.trim()));
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri,
        canonical_querystring,
        canonical_headers_str,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(credentials.secret_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key, credential_scope, signed_headers, signature
    );

    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&authorization)?,
    );

    Ok(())
}
