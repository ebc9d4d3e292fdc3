//! Check body capture and option application against JSON vectors stored in
//! `test-vectors/`.
//!
//! Each vector file lists named cases with their inputs and the expected
//! observable result. Header expectations are compared by lookup, not by
//! serialized order.

use http::Method;
use intercept_core::{ClientRequest, Encoding, Interceptor, RequestOptions, Scheduler};

fn intercepted(options: &RequestOptions) -> Result<ClientRequest, intercept_core::InterceptError> {
    let req = ClientRequest::new(Method::POST, "/");
    Interceptor::new(Scheduler::new()).intercept(&req, options)?;
    Ok(req)
}

/// Parse the encoding name used by the vectors.
fn parse_encoding(s: &str) -> Encoding {
    match s {
        "utf8" => Encoding::Utf8,
        "hex" => Encoding::Hex,
        "base64" => Encoding::Base64,
        "latin1" => Encoding::Latin1,
        other => panic!("unknown encoding: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

#[test]
fn body_test_vectors() {
    let raw = include_str!("../../test-vectors/body.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let req = intercepted(&RequestOptions::default()).unwrap();

        for chunk in case["chunks"].as_array().unwrap() {
            let encoding = parse_encoding(chunk["encoding"].as_str().unwrap());
            let data = chunk["data"].as_str().unwrap();
            req.write_encoded(data, encoding)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        req.end();

        assert_eq!(
            req.body().as_deref(),
            case["expected_body"].as_str(),
            "{name}: body"
        );
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[test]
fn options_test_vectors() {
    let raw = include_str!("../../test-vectors/options.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let result = serde_json::from_value::<RequestOptions>(case["options"].clone())
            .map_err(intercept_core::InterceptError::from)
            .and_then(|options| intercepted(&options));

        if case["error"].as_bool().unwrap_or(false) {
            assert!(result.is_err(), "{name}: expected an error");
            continue;
        }
        let req = result.unwrap_or_else(|e| panic!("{name}: {e}"));

        let expected = case["expected_headers"].as_object().unwrap();
        assert_eq!(req.headers().len(), expected.len(), "{name}: header count");
        for (header, value) in expected {
            assert_eq!(
                req.header(header).as_deref(),
                value.as_str(),
                "{name}: header {header}"
            );
        }
        assert_eq!(req.path(), case["expected_path"].as_str().unwrap(), "{name}: path");
    }
}
