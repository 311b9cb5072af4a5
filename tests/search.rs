mod common;

use common::{client_for, config_for, granule_page, ids};
use maap::{Error, SearchQuery};
use mockito::Matcher;

#[test]
fn pagination_requests_ceil_limit_over_page_size() {
    let mut server = mockito::Server::new();
    let pages: Vec<_> = (1..=3)
        .map(|page| {
            let start = (page - 1) * 2;
            server
                .mock("GET", "/api/cmr/granules")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("short_name".into(), "GEDI02_A".into()),
                    Matcher::UrlEncoded("page_num".into(), page.to_string()),
                    Matcher::UrlEncoded("page_size".into(), "2".into()),
                ]))
                .with_status(200)
                .with_body(granule_page(&ids(start..start + 2)))
                .expect(1)
                .create()
        })
        .collect();
    let beyond = server
        .mock("GET", "/api/cmr/granules")
        .match_query(Matcher::UrlEncoded("page_num".into(), "4".into()))
        .expect(0)
        .create();

    let client = config_for(&server, |c| c.with_page_size(2));
    let granules = client
        .search_granules(&SearchQuery::new().short_name("GEDI02_A").limit(5))
        .unwrap();

    assert_eq!(granules.len(), 5);
    assert_eq!(granules[0].concept_id(), Some("G0-MAAP"));
    assert_eq!(granules[4].granule_ur(), Some("G4-MAAP_UR"));
    for page in &pages {
        page.assert();
    }
    beyond.assert();
}

#[test]
fn short_page_ends_pagination() {
    let mut server = mockito::Server::new();
    let first = server
        .mock("GET", "/api/cmr/granules")
        .match_query(Matcher::UrlEncoded("page_num".into(), "1".into()))
        .with_body(granule_page(&ids(0..3)))
        .expect(1)
        .create();
    let second = server
        .mock("GET", "/api/cmr/granules")
        .match_query(Matcher::UrlEncoded("page_num".into(), "2".into()))
        .with_body(granule_page(&ids(3..4)))
        .expect(1)
        .create();

    let client = config_for(&server, |c| c.with_page_size(3));
    let granules = client
        .search_granules(&SearchQuery::new().concept_id("G*").limit(50))
        .unwrap();

    assert_eq!(granules.len(), 4);
    first.assert();
    second.assert();
}

#[test]
fn query_carries_only_supplied_parameters() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/cmr/collections")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("instrument[]".into(), "uavsar".into()),
            Matcher::UrlEncoded("instrument[]".into(), "lvis".into()),
            Matcher::UrlEncoded("page_num".into(), "1".into()),
        ]))
        .match_header("token", "test-token")
        .match_header("accept", "application/echo10+xml")
        .with_body(
            r#"<results><result concept-id="C1-MAAP"><Collection><ShortName>AfriSAR_UAVSAR</ShortName></Collection></result></results>"#,
        )
        .create();

    let client = client_for(&server);
    let collections = client
        .search_collections(&SearchQuery::new().instrument("uavsar|lvis"))
        .unwrap();

    mock.assert();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].short_name(), Some("AfriSAR_UAVSAR"));
    assert!(collections[0].download_url().ends_with("/search/concepts/C1-MAAP.umm-json"));
}

#[test]
fn non_success_status_is_reported() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/cmr/granules")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("upstream unavailable")
        .expect(1)
        .create();

    let client = client_for(&server);
    let err = client
        .search_granules(&SearchQuery::new().short_name("GEDI02_A"))
        .unwrap_err();

    mock.assert();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_transient());
}

#[test]
fn catalog_error_document() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/cmr/granules")
        .match_query(Matcher::Any)
        .with_body("<errors><error>Parameter [foo] was not recognized.</error></errors>")
        .create();

    let client = client_for(&server);
    let err = client
        .search_granules(&SearchQuery::new().param("foo", "bar"))
        .unwrap_err();
    match err {
        Error::Catalog(msg) => assert!(msg.contains("foo")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_query_sends_nothing() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create();

    let client = client_for(&server);
    let query = SearchQuery::new()
        .bounding_box("-10,-10,10,10")
        .polygon("-10,-10,10,-10,10,10,-10,-10");
    assert!(matches!(
        client.search_granules(&query),
        Err(Error::Validation(_))
    ));
    mock.assert();
}
