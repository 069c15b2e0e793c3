//! AWS Signature Version 4 request signing.
//!
//! Only the subset needed here: POST requests with an empty query string.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Identifies who signs and for which endpoint scope.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
}

/// Signs a request, returning the headers to add to it.
///
/// `headers` must contain every header that will be sent and signed, with
/// lowercase names, except `x-amz-date` and `x-amz-security-token`, which are
/// added here.
pub fn sign(
    params: &SigningParams<'_>,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &[u8],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut signed: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect();
    signed.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &params.credentials.session_token {
        signed.push(("x-amz-security-token".to_string(), token.clone()));
    }
    signed.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = signed.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
    let signed_headers = signed
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n{path}\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex::encode(Sha256::digest(body))
    );

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        params.credentials.access_key_id
    );

    let mut out = vec![
        ("x-amz-date".to_string(), amz_date),
        ("authorization".to_string(), authorization),
    ];
    if let Some(token) = &params.credentials.session_token {
        out.push(("x-amz-security-token".to_string(), token.clone()));
    }
    out
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds(token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: token.map(String::from),
        }
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_sign_produces_authorization_header() {
        let credentials = creds(None);
        let params = SigningParams {
            credentials: &credentials,
            region: "eu-west-1",
            service: "athena",
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let headers = vec![
            ("host".to_string(), "athena.eu-west-1.amazonaws.com".to_string()),
            ("X-Amz-Target".to_string(), "AmazonAthena.GetWorkGroup".to_string()),
        ];

        let out = sign(&params, "POST", "/", &headers, b"{}", now);

        assert_eq!(out[0], ("x-amz-date".to_string(), "20240301T120000Z".to_string()));
        let auth = &out[1].1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/eu-west-1/athena/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-target"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_sign_is_deterministic_and_includes_token() {
        let credentials = creds(Some("session"));
        let params = SigningParams {
            credentials: &credentials,
            region: "us-east-1",
            service: "athena",
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let headers = vec![("host".to_string(), "localhost".to_string())];

        let a = sign(&params, "POST", "/", &headers, b"{}", now);
        let b = sign(&params, "POST", "/", &headers, b"{}", now);

        assert_eq!(a, b);
        assert!(a[1].1.contains("x-amz-security-token"));
        assert_eq!(a[2], ("x-amz-security-token".to_string(), "session".to_string()));
    }
}
