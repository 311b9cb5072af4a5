mod common;

use common::{client_for, config_for};
use maap::{Error, UploadConfig};
use mockito::Matcher;

fn upload_config(server: &mockito::Server) -> UploadConfig {
    UploadConfig::new("user-uploads")
        .with_prefix("shared/jdoe")
        .with_credentials("AKIDEXAMPLE", "secret")
        .with_region("us-west-2")
        .with_endpoint_url(server.url())
}

#[test]
fn files_land_under_one_random_directory() {
    let mut server = mockito::Server::new();
    let put = server
        .mock(
            "PUT",
            Matcher::Regex(r"^/user-uploads/shared/jdoe/[0-9a-f-]{36}/(notes\.txt|shapes\.geojson)$".into()),
        )
        .match_query(Matcher::Any)
        .match_header("authorization", Matcher::Regex("^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/".into()))
        .with_header("etag", "\"0123\"")
        .expect(2)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    let shapes = dir.path().join("shapes.geojson");
    std::fs::write(&notes, "plot 7").unwrap();
    std::fs::write(&shapes, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();

    let cfg = upload_config(&server);
    let client = config_for(&server, |c| c.with_upload(cfg));
    let upload = client.upload_files(&[&notes, &shapes]).unwrap();

    put.assert();
    assert_eq!(upload.bucket, "user-uploads");
    assert_eq!(upload.subdirectory.len(), 36);
    assert_eq!(
        upload.keys,
        [
            format!("shared/jdoe/{}/notes.txt", upload.subdirectory),
            format!("shared/jdoe/{}/shapes.geojson", upload.subdirectory),
        ]
    );
}

#[test]
fn missing_bucket_or_files_fail_before_sending() {
    let mut server = mockito::Server::new();
    let any = server.mock("PUT", Matcher::Any).expect(0).create();
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("present.txt");
    std::fs::write(&present, "x").unwrap();

    let unconfigured = client_for(&server);
    assert!(matches!(
        unconfigured.upload_files(&[&present]),
        Err(Error::Config(_))
    ));

    let cfg = upload_config(&server);
    let client = config_for(&server, |c| c.with_upload(cfg));
    let none: [&std::path::Path; 0] = [];
    assert!(matches!(client.upload_files(&none), Err(Error::Validation(_))));
    assert!(matches!(
        client.upload_files(&[present.clone(), dir.path().join("absent.txt")]),
        Err(Error::Io(_))
    ));
    assert!(matches!(
        client.upload_files(&[dir.path()]),
        Err(Error::Validation(_))
    ));
    any.assert();
}
