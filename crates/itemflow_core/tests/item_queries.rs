use chrono::{Duration, TimeZone, Utc};
use itemflow_core::db::open_pool_in_memory;
use itemflow_core::pagination::encode_cursor;
use itemflow_core::{
    Item, ItemCore, ItemQueryService, ItemRepository, ItemsQuery, PageArgs, PageError,
    QueryError, SqliteItemRepository,
};
use uuid::Uuid;

fn seeded_service(publication: Uuid) -> (ItemQueryService<SqliteItemRepository>, Vec<Item>) {
    let repo = SqliteItemRepository::new(open_pool_in_memory().unwrap());
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 6, 0, 0).unwrap();
    let items: Vec<Item> = (0..5)
        .map(|n| {
            Item::new(ItemCore::new(
                publication,
                start + Duration::minutes(n * 10),
                format!("Hourly bulletin {n}"),
            ))
        })
        .collect();
    for item in &items {
        repo.create(item).unwrap();
    }
    repo.create(&Item::new(ItemCore::new(
        Uuid::new_v4(),
        start,
        "Unrelated publication",
    )))
    .unwrap();
    (ItemQueryService::new(repo), items)
}

#[test]
fn items_connection_pages_through_newest_first() {
    let publication = Uuid::new_v4();
    let (service, items) = seeded_service(publication);

    let first_page = service
        .items_connection(&ItemsQuery {
            publication_uuid: Some(publication),
            sort_asc: false,
            page: PageArgs::first(2),
        })
        .unwrap();
    let connection = first_page.connection();
    let ids: Vec<_> = connection.nodes().iter().map(|it| it.uuid).collect();
    assert_eq!(ids, vec![items[4].uuid, items[3].uuid]);
    assert_eq!(connection.total_count(), 5);

    let end_cursor = connection.page_info().end_cursor.unwrap();
    let second_page = service
        .items_connection(&ItemsQuery {
            publication_uuid: Some(publication),
            sort_asc: false,
            page: PageArgs::first(2).after(end_cursor),
        })
        .unwrap();
    let ids: Vec<_> = second_page
        .connection()
        .nodes()
        .iter()
        .map(|it| it.uuid)
        .collect();
    assert_eq!(ids, vec![items[2].uuid, items[1].uuid]);
    assert!(second_page.connection().page_info().has_next_page);
}

#[test]
fn items_connection_surfaces_page_errors() {
    let publication = Uuid::new_v4();
    let (service, _) = seeded_service(publication);

    let err = service
        .items_connection(&ItemsQuery {
            publication_uuid: Some(publication),
            sort_asc: true,
            page: PageArgs::default().after(encode_cursor(Uuid::new_v4())),
        })
        .unwrap_err();
    assert!(matches!(err, QueryError::Page(PageError::CursorNotFound(_))));
}

#[test]
fn item_lookup_and_counts() {
    let publication = Uuid::new_v4();
    let (service, items) = seeded_service(publication);

    let found = service.item(items[0].uuid).unwrap().unwrap();
    assert_eq!(found, items[0]);
    assert!(service.item(Uuid::new_v4()).unwrap().is_none());

    assert_eq!(service.total_count(Some(publication)).unwrap(), 5);
    assert_eq!(service.total_count(None).unwrap(), 6);
    assert_eq!(service.items(Some(publication), true).unwrap(), items);
    service.healthcheck().unwrap();
}
