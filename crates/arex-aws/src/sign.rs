//! AWS Signature Version 4 request signing.

use crate::client::AwsCredentials;
use crate::error::{AwsError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// One request to be signed. `uri` and `query` must already be in canonical
/// (percent-encoded, sorted) form; `headers` carries any headers beyond
/// `host` and `x-amz-date` that should participate in the signature, with
/// lowercase names.
pub struct SignRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub uri: &'a str,
    pub query: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
    pub timestamp: DateTime<Utc>,
}

/// The signature output: the `Authorization` header value plus the
/// `x-amz-date` value the caller must send verbatim.
pub struct Signature {
    pub authorization: String,
    pub amz_date: String,
}

/// Signs `request` with the SigV4 algorithm.
pub fn sign_request(credentials: &AwsCredentials, request: &SignRequest<'_>) -> Result<Signature> {
    let amz_date = request.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.timestamp.format("%Y%m%d").to_string();

    // Step 1: Build canonical request
    let mut headers: Vec<(&str, &str)> = vec![("host", request.host), ("x-amz-date", &amz_date)];
    headers.extend_from_slice(request.headers);
    headers.sort_by_key(|(name, _)| *name);

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let hashed_payload = format!("{:x}", Sha256::digest(request.payload));
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method, request.uri, request.query, canonical_headers, signed_headers, hashed_payload
    );
    let hashed_canonical_request = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));

    // Step 2: Build string to sign
    let credential_scope = format!("{}/{}/{}/aws4_request", date, request.region, request.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM, amz_date, credential_scope, hashed_canonical_request
    );

    // Step 3: Calculate signature with the derived signing key
    let secret_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    )?;
    let secret_region = hmac_sha256(&secret_date, request.region.as_bytes())?;
    let secret_service = hmac_sha256(&secret_region, request.service.as_bytes())?;
    let secret_signing = hmac_sha256(&secret_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes())?);

    // Step 4: Build authorization header
    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
    );

    Ok(Signature {
        authorization,
        amz_date,
    })
}

/// HMAC-SHA256 helper function
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AwsError::Hmac(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encodes `input` with the SigV4 unreserved character set
/// (`A-Z a-z 0-9 - _ . ~`), uppercase hex for everything else.
pub fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Builds a canonical query string: pairs percent-encoded, then sorted by
/// encoded key and value. Also the form-body encoding for Query APIs.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> AwsCredentials {
        AwsCredentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            None,
        )
    }

    fn reference_request<'a>(headers: &'a [(&'a str, &'a str)]) -> SignRequest<'a> {
        SignRequest {
            method: "GET",
            host: "iam.amazonaws.com",
            uri: "/",
            query: "Action=ListUsers&Version=2010-05-08",
            service: "iam",
            region: "us-east-1",
            headers,
            payload: b"",
            timestamp: "2015-08-30T12:36:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_hmac_sha256() {
        let key = b"key";
        let data = b"The quick brown fox jumps over the lazy dog";
        let result = hmac_sha256(key, data).unwrap();
        let hex_result = hex::encode(result);
        // This is a known test vector
        assert_eq!(
            hex_result,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn signature_matches_reference_vector() {
        // The worked SigV4 example from the AWS documentation: a ListUsers
        // GET against IAM at 2015-08-30T12:36:00Z with the demo key pair.
        let headers = [(
            "content-type",
            "application/x-www-form-urlencoded; charset=utf-8",
        )];
        let signature = sign_request(&test_credentials(), &reference_request(&headers)).unwrap();

        assert_eq!(signature.amz_date, "20150830T123600Z");
        assert_eq!(
            signature.authorization,
            "AWS4-HMAC-SHA256 \
             Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
        );
    }

    #[test]
    fn signature_has_expected_shape() {
        let signature = sign_request(&test_credentials(), &reference_request(&[])).unwrap();
        assert!(signature.authorization.starts_with("AWS4-HMAC-SHA256"));
        assert!(signature.authorization.contains("Credential="));
        assert!(signature.authorization.contains("SignedHeaders=host;x-amz-date"));
        assert!(signature.authorization.contains("Signature="));
    }

    #[test]
    fn session_token_header_participates_in_signature() {
        let headers = [("x-amz-security-token", "FwoGZXIvYXdzEBc")];
        let signature = sign_request(&test_credentials(), &reference_request(&headers)).unwrap();
        assert!(signature
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
    }

    #[test]
    fn percent_encode_leaves_unreserved_untouched() {
        assert_eq!(percent_encode("us-east-1"), "us-east-1");
        assert_eq!(percent_encode("AZaz09-_.~"), "AZaz09-_.~");
        assert_eq!(percent_encode("a b+c/d"), "a%20b%2Bc%2Fd");
    }

    #[test]
    fn canonical_query_sorts_encoded_pairs() {
        let params = [("Version", "2016-11-15"), ("Action", "DescribeVpcs")];
        assert_eq!(
            canonical_query(&params),
            "Action=DescribeVpcs&Version=2016-11-15"
        );
    }
}
