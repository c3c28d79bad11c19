//! End-to-end tests through the HTTP router
//!
//! Requests go through the full router, intake, batch conversion and
//! archiving with the scripted engine standing in for ffmpeg.

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use crate::config::ServerConfig;
    use crate::http::create_router;
    use crate::integration::fixtures::{multipart_body, FakeEngine};
    use crate::state::AppState;

    const BOUNDARY: &str = "----batch-transcoder-test";
    const CODE: &str = "DJ2024";

    struct TestServer {
        tmp: TempDir,
        state: Arc<AppState>,
    }

    impl TestServer {
        fn new() -> Self {
            Self::with_config(|_| {})
        }

        fn with_config(adjust: impl FnOnce(&mut ServerConfig)) -> Self {
            let tmp = TempDir::new().unwrap();
            let mut config = ServerConfig::default();
            config.storage.root = tmp.path().to_path_buf();
            config.access_code = CODE.to_string();
            adjust(&mut config);
            let state = Arc::new(AppState::new(config, Arc::new(FakeEngine::default()), None));
            Self { tmp, state }
        }

        fn router(&self) -> Router {
            create_router(self.state.clone())
        }

        fn inbound(&self, session: &str) -> std::path::PathBuf {
            self.tmp.path().join("uploads").join(session)
        }

        async fn convert(
            &self,
            fields: &[(&str, &str)],
            files: &[(&str, &str, &str, &[u8])],
        ) -> Response {
            let request = Request::post("/api/convert")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(BOUNDARY, fields, files)))
                .unwrap();
            self.router().oneshot(request).await.unwrap()
        }

        async fn download(&self, session: &str) -> Response {
            let request = Request::get(format!("/api/download/{}", session))
                .header("x-access-code", CODE)
                .body(Body::empty())
                .unwrap();
            self.router().oneshot(request).await.unwrap()
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn zip_entries(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_convert_then_download() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "abc123")],
                &[
                    ("audioFiles", "track1.wav", "audio/wav", b"RIFF1"),
                    ("audioFiles", "track2.flac", "audio/flac", b"fLaC2"),
                ],
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "sessionId": "abc123",
                "successful": 2,
                "failed": 0,
                "results": [
                    {"original": "track1.wav", "converted": "track1.mp3", "status": "success"},
                    {"original": "track2.flac", "converted": "track2.mp3", "status": "success"}
                ],
                "errors": [],
                "downloadLocator": "abc123",
                "downloadUrl": "/api/download/abc123"
            })
        );

        let response = server.download("abc123").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"converted_abc123.zip\""
        );
        let declared_len: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let bytes = body_bytes(response).await;
        assert_eq!(bytes.len(), declared_len);
        assert_eq!(zip_entries(bytes), vec!["track1.mp3", "track2.mp3"]);

        let snapshot = server.state.metrics.snapshot();
        assert_eq!(snapshot.files_converted, 2);
        assert_eq!(snapshot.archives_served, 1);
        // Inbound after conversion, outbound after delivery
        assert_eq!(server.state.coordinator.cleanup().pending_count(), 2);
    }

    #[tokio::test]
    async fn test_one_bad_file_does_not_affect_others() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "mixed")],
                &[
                    ("audioFiles", "a.wav", "audio/wav", b"RIFF"),
                    ("audioFiles", "corrupt.ogg", "audio/ogg", b"OggS"),
                    ("audioFiles", "c.mp3", "audio/mpeg", b"ID3"),
                ],
            )
            .await;

        let body = body_json(response).await;
        assert_eq!(body["successful"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["errors"][0]["original"], "corrupt.ogg");
        assert_eq!(body["errors"][0]["status"], "error");
        let message = body["errors"][0]["error"].as_str().unwrap();
        assert!(message.contains("Invalid data"));
        assert!(!message.contains(server.tmp.path().to_str().unwrap()));

        let entries = zip_entries(body_bytes(server.download("mixed").await).await);
        assert_eq!(entries, vec!["a.mp3", "c.mp3"]);
    }

    #[tokio::test]
    async fn test_all_failures_cannot_be_downloaded() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "allbad")],
                &[("audioFiles", "corrupt.wav", "audio/wav", b"junk")],
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["successful"], 0);
        assert!(body.get("downloadLocator").is_none());

        assert_eq!(server.download("allbad").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_code_in_header() {
        let server = TestServer::new();
        let request = Request::post("/api/convert?unused=1")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header("x-access-code", CODE)
            .body(Body::from(multipart_body(
                BOUNDARY,
                &[],
                &[("audioFiles", "a.wav", "audio/wav", b"RIFF")],
            )))
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // Generated when not supplied
        assert_eq!(body["sessionId"].as_str().unwrap().len(), 36);
    }

    #[tokio::test]
    async fn test_padded_code_field_is_accepted() {
        let server = TestServer::new();
        let padded = format!("  {} ", CODE);

        let response = server
            .convert(
                &[("accessCode", padded.as_str()), ("sessionId", "padded")],
                &[("audioFiles", "a.wav", "audio/wav", b"RIFF")],
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["successful"], 1);
    }

    #[tokio::test]
    async fn test_wrong_code_stores_nothing() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", "nope"), ("sessionId", "intruder")],
                &[("audioFiles", "a.wav", "audio/wav", b"RIFF")],
            )
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!server.inbound("intruder").exists());
        assert_eq!(server.state.metrics.error_count("unauthorized"), 1);
    }

    #[tokio::test]
    async fn test_no_files() {
        let server = TestServer::new();

        let response = server.convert(&[("accessCode", CODE)], &[]).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "no files were submitted");
        assert_eq!(server.state.metrics.snapshot().batches, 0);
    }

    #[tokio::test]
    async fn test_no_files_without_code_is_unauthorized() {
        let server = TestServer::new();
        let response = server.convert(&[], &[]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsupported_file_rejects_whole_request() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "reject1")],
                &[
                    ("audioFiles", "a.wav", "audio/wav", b"RIFF"),
                    ("audioFiles", "notes.txt", "text/plain", b"hello"),
                ],
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["message"]
            .as_str()
            .unwrap()
            .contains("notes.txt"));
        // Already staged files are removed again
        assert!(!server.inbound("reject1").exists());
        assert_eq!(server.state.metrics.snapshot().batches, 0);
    }

    #[tokio::test]
    async fn test_session_id_after_files_is_rejected() {
        let server = TestServer::new();
        let mut body = multipart_body(
            BOUNDARY,
            &[("accessCode", CODE)],
            &[("audioFiles", "a.wav", "audio/wav", b"RIFF")],
        );
        // Move the closing delimiter behind a trailing sessionId field
        let closing = format!("--{}--\r\n", BOUNDARY);
        body.truncate(body.len() - closing.len());
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"sessionId\"\r\n\r\nlate\r\n{}",
                BOUNDARY, closing
            )
            .as_bytes(),
        );
        let request = Request::post("/api/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!server.tmp.path().join("uploads/late").exists());
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "../escape")],
                &[("audioFiles", "a.wav", "audio/wav", b"RIFF")],
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!server.tmp.path().join("escape").exists());
    }

    #[tokio::test]
    async fn test_too_many_files() {
        let server = TestServer::with_config(|c| c.limits.max_files = 2);

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "many")],
                &[
                    ("audioFiles", "1.wav", "audio/wav", b"RIFF"),
                    ("audioFiles", "2.wav", "audio/wav", b"RIFF"),
                    ("audioFiles", "3.wav", "audio/wav", b"RIFF"),
                ],
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!server.inbound("many").exists());
    }

    #[tokio::test]
    async fn test_oversized_file() {
        let server = TestServer::with_config(|c| c.limits.max_file_size_mb = 1);
        let big = vec![0u8; 1024 * 1024 + 1];

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "big")],
                &[("audioFiles", "big.wav", "audio/wav", &big)],
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["message"]
            .as_str()
            .unwrap()
            .contains("too large"));
    }

    #[tokio::test]
    async fn test_duplicate_uploads_both_convert() {
        let server = TestServer::new();

        let response = server
            .convert(
                &[("accessCode", CODE), ("sessionId", "dupes")],
                &[
                    ("audioFiles", "mix.wav", "audio/wav", b"one"),
                    ("audioFiles", "mix.wav", "audio/wav", b"two"),
                ],
            )
            .await;

        let body = body_json(response).await;
        assert_eq!(body["successful"], 2);
        assert_eq!(body["results"][0]["converted"], "mix.mp3");
        assert_eq!(body["results"][1]["converted"], "mix_2.mp3");

        let entries = zip_entries(body_bytes(server.download("dupes").await).await);
        assert_eq!(entries, vec!["mix.mp3", "mix_2.mp3"]);
    }
}
