use chrono::{Duration, TimeZone, Utc};
use itemflow_core::pagination::{decode_cursor, encode_cursor, page_window, CursorError};
use itemflow_core::{paginate, Item, ItemCore, PageArgs, PageError};
use uuid::Uuid;

/// Items A..E in ascending publish order.
fn fixture() -> Vec<Item> {
    let publication = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
    ["Story A", "Story B", "Story C", "Story D", "Story E"]
        .iter()
        .enumerate()
        .map(|(offset, title)| {
            Item::new(ItemCore::new(
                publication,
                start + Duration::hours(offset as i64),
                *title,
            ))
        })
        .collect()
}

fn titles(items: &[Item]) -> Vec<&str> {
    items.iter().map(Item::title).collect()
}

fn cursor(items: &[Item], index: usize) -> String {
    encode_cursor(items[index].uuid)
}

#[test]
fn cursor_roundtrip_and_rejection() {
    let id = Uuid::new_v4();
    assert_eq!(decode_cursor(&encode_cursor(id)).unwrap(), id);
    assert!(matches!(
        decode_cursor("not-base64!!"),
        Err(CursorError::Encoding { .. })
    ));
}

#[test]
fn no_arguments_selects_everything() {
    let items = fixture();
    let connection = paginate(&items, &PageArgs::default()).unwrap();

    assert_eq!(titles(connection.nodes()).len(), 5);
    let info = connection.page_info();
    assert!(!info.has_next_page);
    assert!(!info.has_previous_page);
    assert_eq!(info.start_cursor, Some(cursor(&items, 0)));
    assert_eq!(info.end_cursor, Some(cursor(&items, 4)));
    assert_eq!(connection.total_count(), 5);
}

#[test]
fn after_with_first_selects_following_items() {
    let items = fixture();
    let args = PageArgs::first(2).after(cursor(&items, 1));
    let connection = paginate(&items, &args).unwrap();

    assert_eq!(titles(connection.nodes()), vec!["Story C", "Story D"]);
    let info = connection.page_info();
    assert!(info.has_next_page);
    assert!(info.has_previous_page);
    assert_eq!(info.start_cursor, Some(cursor(&items, 2)));
    assert_eq!(info.end_cursor, Some(cursor(&items, 3)));
}

#[test]
fn before_with_last_selects_preceding_items() {
    let items = fixture();
    let args = PageArgs::last(2).before(cursor(&items, 3));
    let connection = paginate(&items, &args).unwrap();

    assert_eq!(titles(connection.nodes()), vec!["Story B", "Story C"]);
    let info = connection.page_info();
    assert!(info.has_next_page);
    assert!(info.has_previous_page);
}

#[test]
fn edges_carry_node_cursors() {
    let items = fixture();
    let connection = paginate(&items, &PageArgs::first(3)).unwrap();
    let edges = connection.edges();

    assert_eq!(edges.len(), 3);
    for (edge, item) in edges.iter().zip(&items) {
        assert_eq!(edge.cursor, encode_cursor(item.uuid));
        assert!(std::ptr::eq(edge.node, item));
    }
    assert!(connection.page_info().has_next_page);
    assert!(!connection.page_info().has_previous_page);
}

#[test]
fn after_past_before_is_invalid_range() {
    let items = fixture();
    let args = PageArgs::default()
        .after(cursor(&items, 3))
        .before(cursor(&items, 1));
    assert!(matches!(
        paginate(&items, &args),
        Err(PageError::InvalidPageRange)
    ));

    let adjacent = PageArgs::default()
        .after(cursor(&items, 1))
        .before(cursor(&items, 2));
    assert!(matches!(
        paginate(&items, &adjacent),
        Err(PageError::InvalidPageRange)
    ));
}

#[test]
fn empty_input_yields_empty_connection() {
    let items: Vec<Item> = Vec::new();
    let args = PageArgs::first(10).after(encode_cursor(Uuid::new_v4()));
    let connection = paginate(&items, &args).unwrap();

    assert!(connection.edges().is_empty());
    let info = connection.page_info();
    assert!(!info.has_next_page);
    assert!(!info.has_previous_page);
    assert!(info.start_cursor.is_none());
    assert!(info.end_cursor.is_none());
}

#[test]
fn zero_first_is_an_empty_window() {
    let items = fixture();
    let connection = paginate(&items, &PageArgs::first(0)).unwrap();

    assert!(connection.nodes().is_empty());
    assert!(connection.window().is_empty());
    assert!(connection.page_info().has_next_page);
    assert!(connection.page_info().start_cursor.is_none());
}

#[test]
fn after_last_item_is_empty_window() {
    let items = fixture();
    let connection = paginate(&items, &PageArgs::default().after(cursor(&items, 4))).unwrap();

    assert!(connection.nodes().is_empty());
    assert!(!connection.page_info().has_next_page);
    assert!(connection.page_info().has_previous_page);
}

#[test]
fn oversized_counts_are_clamped() {
    let items = fixture();
    let first = paginate(&items, &PageArgs::first(i64::MAX)).unwrap();
    assert_eq!(first.nodes().len(), 5);

    let last = paginate(&items, &PageArgs::last(i64::MAX)).unwrap();
    assert_eq!(last.nodes().len(), 5);
}

#[test]
fn first_is_applied_before_last() {
    let items = fixture();
    let args = PageArgs {
        first: Some(4),
        last: Some(2),
        ..PageArgs::default()
    };
    let connection = paginate(&items, &args).unwrap();
    assert_eq!(titles(connection.nodes()), vec!["Story C", "Story D"]);
}

#[test]
fn negative_counts_are_invalid_arguments() {
    let items = fixture();
    assert!(matches!(
        paginate(&items, &PageArgs::first(-1)),
        Err(PageError::InvalidArgument { name: "first", value: -1 })
    ));
    assert!(matches!(
        page_window(&items, &PageArgs::last(-3)),
        Err(PageError::InvalidArgument { name: "last", value: -3 })
    ));
}

#[test]
fn unknown_and_corrupt_cursors_fail() {
    let items = fixture();
    let stranger = Uuid::new_v4();
    assert!(matches!(
        paginate(&items, &PageArgs::default().after(encode_cursor(stranger))),
        Err(PageError::CursorNotFound(id)) if id == stranger
    ));
    assert!(matches!(
        paginate(&items, &PageArgs::default().before("%%%")),
        Err(PageError::Cursor(_))
    ));
}

#[test]
fn connection_serializes_edges_and_page_info() {
    let items = fixture();
    let connection = paginate(&items, &PageArgs::first(1)).unwrap();
    let json = serde_json::to_value(connection).unwrap();

    assert_eq!(json["total_count"], 5);
    assert_eq!(json["edges"][0]["node"]["title"], "Story A");
    assert_eq!(json["edges"][0]["cursor"], cursor(&items, 0));
    assert_eq!(json["page_info"]["has_next_page"], true);
}
