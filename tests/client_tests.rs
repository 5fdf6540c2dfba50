//! End-to-end tests of the reqwest transport against a local mock server.

use mockito::{Matcher, Server};
use tablestore_http::client::{ClientConfig, QueryOptions, TableServiceClient};
use tablestore_http::{Entity, TableClient};

fn config(url: String) -> ClientConfig {
    ClientConfig {
        endpoint: Some(url),
        ..ClientConfig::new("acct", "c2VjcmV0")
    }
}

fn orders(server: &Server) -> TableClient {
    TableClient::new(&config(server.url()), "Orders").unwrap()
}

#[tokio::test]
async fn test_replace_sends_signed_protocol_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/Orders(PartitionKey='p',RowKey='r')")
        .match_header("x-ms-version", "2011-08-18")
        .match_header("dataserviceversion", "2.0;NetFx")
        .match_header("maxdataserviceversion", "2.0;NetFx")
        .match_header("authorization", Matcher::Regex(r"^SharedKey acct:[A-Za-z0-9+/=]+$".into()))
        .match_header("x-ms-date", Matcher::Regex(r"GMT$".into()))
        .match_body(Matcher::Regex(r#"<d:Count m:type="Edm.Int32">3</d:Count>"#.into()))
        .with_status(204)
        .with_header("ETag", "W/%22datetime'2013-01-01'%22")
        .create_async()
        .await;

    let client = orders(&server);
    let mut entity = Entity::new("p", "r").unwrap();
    entity.set("Count", 3i32).unwrap();
    client.insert_or_replace(&mut entity).await.unwrap();

    mock.assert_async().await;
    assert_eq!(entity.etag(), Some("W/\"datetime'2013-01-01'\""));
}

#[tokio::test]
async fn test_merge_uses_merge_method() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("MERGE", "/Orders(PartitionKey='p',RowKey='r')")
        .match_header("if-match", "W/\"1\"")
        .with_status(204)
        .with_header("ETag", "W/\"2\"")
        .create_async()
        .await;

    let client = orders(&server);
    let mut entity = Entity::new("p", "r").unwrap();
    entity.set_etag(Some("W/\"1\"".into()));
    assert!(client.try_merge(&mut entity, &[]).await.unwrap());

    mock.assert_async().await;
    assert_eq!(entity.etag(), Some("W/\"2\""));
}

#[tokio::test]
async fn test_get_missing_entity() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/Orders(PartitionKey='p',RowKey='missing')")
        .with_status(404)
        .with_body("<error><code>ResourceNotFound</code><message>The specified resource does not exist.</message></error>")
        .create_async()
        .await;

    let client = orders(&server);
    assert!(client.get("p", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_query_page_returns_continuation() {
    let mut server = Server::new_async().await;
    let feed = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<feed xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" xmlns="http://www.w3.org/2005/Atom">
  <entry m:etag="W/&quot;1&quot;"><content type="application/xml"><m:properties><d:PartitionKey>p</d:PartitionKey><d:RowKey>a</d:RowKey><d:Total m:type="Edm.Double">10.5</d:Total></m:properties></content></entry>
  <entry m:etag="W/&quot;2&quot;"><content type="application/xml"><m:properties><d:PartitionKey>p</d:PartitionKey><d:RowKey>b</d:RowKey><d:Total m:type="Edm.Double">3</d:Total></m:properties></content></entry>
</feed>"#;
    let mock = server
        .mock("GET", "/Orders")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("$filter".into(), "PartitionKey eq 'p'".into()),
            Matcher::UrlEncoded("$top".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("x-ms-continuation-NextPartitionKey", "1!4!cA--")
        .with_header("x-ms-continuation-NextRowKey", "1!4!Yw--")
        .with_body(feed)
        .create_async()
        .await;

    let client = orders(&server);
    let page = client
        .query_page(&QueryOptions::new().partition("p").top(2), None)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(page.entities.len(), 2);
    assert_eq!(page.entities[0].get_f64("Total"), Some(10.5));
    assert_eq!(page.entities[1].etag(), Some("W/\"2\""));
    let continuation = page.continuation.unwrap();
    assert_eq!(continuation.next_partition_key, "1!4!cA--");
    assert_eq!(continuation.next_row_key.as_deref(), Some("1!4!Yw--"));
}

#[tokio::test]
async fn test_batch_commit_round_trip() {
    let mut server = Server::new_async().await;
    let body = "--batchresponse_7\r\n\
        Content-Type: multipart/mixed; boundary=changesetresponse_7\r\n\
        \r\n\
        --changesetresponse_7\r\n\
        Content-Type: application/http\r\n\
        Content-Transfer-Encoding: binary\r\n\
        \r\n\
        HTTP/1.1 204 No Content\r\n\
        Content-ID: 0\r\n\
        ETag: W/\"fresh\"\r\n\
        \r\n\
        --changesetresponse_7\r\n\
        Content-Type: application/http\r\n\
        Content-Transfer-Encoding: binary\r\n\
        \r\n\
        HTTP/1.1 204 No Content\r\n\
        Content-ID: 1\r\n\
        \r\n\
        --changesetresponse_7--\r\n\
        --batchresponse_7--\r\n";
    let mock = server
        .mock("POST", "/$batch")
        .match_header("content-type", Matcher::Regex(r"^multipart/mixed; boundary=batch_".into()))
        .match_body(Matcher::Regex(r"MERGE http://[^ ]+/Orders\(PartitionKey='p',RowKey='1'\) HTTP/1\.1".into()))
        .with_status(202)
        .with_header("Content-Type", "multipart/mixed; boundary=batchresponse_7")
        .with_body(body)
        .create_async()
        .await;

    let client = orders(&server);
    let mut batch = client.batch();
    batch.merge(Entity::new("p", "1").unwrap(), true).unwrap();
    batch.delete_key("p", "2", None).unwrap();
    client.commit(&mut batch).await.unwrap();

    mock.assert_async().await;
    assert_eq!(batch.entity(0).and_then(Entity::etag), Some("W/\"fresh\""));
}

#[tokio::test]
async fn test_try_create_table_conflict() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/Tables")
        .match_body(Matcher::Regex("<d:TableName>Orders</d:TableName>".into()))
        .with_status(409)
        .with_body("<error><code>TableAlreadyExists</code><message>The table specified already exists.</message></error>")
        .create_async()
        .await;

    let service = TableServiceClient::new(&config(server.url())).unwrap();
    assert!(!service.try_create_table("Orders").await.unwrap());

    let err = service.create_table("Orders").await.unwrap_err();
    assert_eq!(err.error_code(), Some("TableAlreadyExists"));
}
