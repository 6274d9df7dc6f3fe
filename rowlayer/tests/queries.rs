mod common;

use rowlayer::{bson::doc, memory::MemoryStore, prelude::*};
use serde::Deserialize;

use common::{NewTask, NewUser, Task, User, ids, soft_config};

async fn seed_tasks(tasks: &EntityService<&MemoryStore, Task>, count: usize) {
    for n in 0..count {
        let id = format!("t{n:02}");
        tasks
            .create(NewTask::new(&id, &format!("task {n}"), "acme"), &NoHooks)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn pages_are_disjoint_and_cover_every_row() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    seed_tasks(&tasks, 25).await;

    let mut seen = Vec::new();
    for page in 1..=3 {
        let options = QueryOptions::builder()
            .page(page)
            .limit(10)
            .order_by("id", SortDirection::Asc)
            .build();
        let rows = tasks.find(&options).await.unwrap();

        assert_eq!(rows.len(), if page < 3 { 10 } else { 5 });
        assert_eq!(rows[0].id, format!("t{:02}", (page - 1) * 10));
        seen.extend(rows.into_iter().map(|task| task.id));
    }

    let expected = (0..25).map(|n| format!("t{n:02}")).collect::<Vec<_>>();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn page_size_is_capped_by_max_limit() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store
        .service::<Task>(ServiceConfig::builder().max_limit(4).build())
        .unwrap();
    seed_tasks(&tasks, 6).await;

    let rows = tasks
        .find(&QueryOptions::builder().limit(50).build())
        .await
        .unwrap();

    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn unpaginated_find_returns_everything() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(ServiceConfig::default()).unwrap();
    seed_tasks(&tasks, 150).await;

    assert_eq!(tasks.find(&QueryOptions::new()).await.unwrap().len(), 150);
}

#[tokio::test]
async fn cursor_pages_cover_the_table_and_terminate() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    for n in 0..5 {
        tasks
            .create(
                NewTask::new(&format!("t{n}"), "task", "acme").created_at(n as u32),
                &NoHooks,
            )
            .await
            .unwrap();
    }

    let mut collected = Vec::new();
    let mut options = QueryOptions::builder().limit(2).build();
    for _ in 0..10 {
        let page = tasks.find_with_cursor(&options).await.unwrap();
        assert_eq!(page.pagination.total, 5);
        collected.extend(page.items.iter().map(|task| task.id.clone()));

        match page.next_cursor {
            Some(cursor) => options = options.to_builder().cursor(cursor).build(),
            None => break,
        }
    }

    assert_eq!(collected, vec!["t0", "t1", "t2", "t3", "t4"]);
}

#[tokio::test]
async fn cursor_skips_rows_tied_with_the_page_boundary() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    for (id, second) in [("t1", 1), ("t2", 2), ("t3", 2), ("t4", 3)] {
        tasks
            .create(NewTask::new(id, "task", "acme").created_at(second), &NoHooks)
            .await
            .unwrap();
    }

    let first = tasks
        .find_with_cursor(&QueryOptions::builder().limit(2).build())
        .await
        .unwrap();
    assert_eq!(ids(&first.items), vec!["t1", "t2"]);

    let cursor = first.next_cursor.unwrap();
    let second = tasks
        .find_with_cursor(&QueryOptions::builder().limit(2).cursor(cursor).build())
        .await
        .unwrap();

    assert_eq!(ids(&second.items), vec!["t4"]);
    assert_eq!(second.pagination.total, 4);
}

#[tokio::test]
async fn huge_page_numbers_return_an_empty_page() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    seed_tasks(&tasks, 3).await;

    let rows = tasks
        .find(&QueryOptions::builder().page(usize::MAX).limit(10).build())
        .await
        .unwrap();

    assert!(rows.is_empty());
}

#[tokio::test]
async fn cursor_page_metadata() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    for n in 0..5 {
        tasks
            .create(
                NewTask::new(&format!("t{n}"), "task", "acme").created_at(n as u32),
                &NoHooks,
            )
            .await
            .unwrap();
    }

    let page = tasks
        .find_with_cursor(&QueryOptions::builder().page(2).limit(2).build())
        .await
        .unwrap();

    assert_eq!(ids(&page.items), vec!["t2", "t3"]);
    assert_eq!(page.pagination.total, 5);
    assert!(page.pagination.has_next);
    assert!(page.pagination.has_prev);
    assert_eq!(
        page.next_cursor,
        Some(page.items[1].created_at.to_chrono())
    );
}

#[tokio::test]
async fn workspace_scopes_both_page_and_total() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    for (id, workspace) in [("a1", "a"), ("b1", "b"), ("a2", "a"), ("a3", "a"), ("b2", "b")] {
        tasks
            .create(NewTask::new(id, "task", workspace), &NoHooks)
            .await
            .unwrap();
    }

    let options = QueryOptions::builder()
        .workspace("workspace", "a")
        .limit(2)
        .order_by("id", SortDirection::Asc)
        .build();
    let page = tasks.find_with_cursor(&options).await.unwrap();

    assert_eq!(ids(&page.items), vec!["a1", "a2"]);
    assert_eq!(page.pagination.total, 3);
    assert_eq!(tasks.count(None, &options).await.unwrap(), 3);
}

#[tokio::test]
async fn find_by_treats_null_as_missing() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    tasks
        .create(NewTask::new("t1", "mine", "acme").owned_by("u1"), &NoHooks)
        .await
        .unwrap();
    tasks
        .create(NewTask::new("t2", "nobody's", "acme"), &NoHooks)
        .await
        .unwrap();

    let unowned = tasks
        .find_by(doc! { "owner_id": null }, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(ids(&unowned), vec!["t2"]);

    let either = tasks
        .find_by_matching(doc! { "id": "t1", "title": "nobody's" }, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(either.len(), 2);
}

#[tokio::test]
async fn search_parses_filter_expressions() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    for (id, title) in [("t1", "Write report"), ("t2", "Read report"), ("t3", "Lunch")] {
        tasks
            .create(NewTask::new(id, title, "acme"), &NoHooks)
            .await
            .unwrap();
    }

    let criteria = FilterCriteria::new()
        .field("title", FilterExpression::new("@*%1").value("REPORT"))
        .field("id", FilterExpression::new("%1|%2").values(["t1", "t3"]));
    let found = tasks.search(&criteria, &QueryOptions::new()).await.unwrap();

    assert_eq!(ids(&found), vec!["t1"]);
}

#[tokio::test]
async fn search_rejects_unknown_columns() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();

    let criteria = FilterCriteria::new().field("colour", FilterExpression::new("%1").value("red"));
    let err = tasks
        .search(&criteria, &QueryOptions::new())
        .await
        .unwrap_err();

    match err {
        ServiceError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("colour")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[derive(Debug, Deserialize)]
struct Owner {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TaskWithOwner {
    id: String,
    owner: Option<Owner>,
}

#[tokio::test]
async fn relations_are_nested_under_their_alias() {
    let store = DataStore::new(MemoryStore::new());
    let users = store.service::<User>(ServiceConfig::default()).unwrap();
    let tasks = store.service::<Task>(soft_config()).unwrap();

    users
        .create(NewUser { id: "u1".into(), name: "Ada".into() }, &NoHooks)
        .await
        .unwrap();
    tasks
        .create(NewTask::new("t1", "owned", "acme").owned_by("u1"), &NoHooks)
        .await
        .unwrap();
    tasks
        .create(NewTask::new("t2", "orphan", "acme"), &NoHooks)
        .await
        .unwrap();

    let options = QueryOptions::builder()
        .relation(Join::left("users", "owner", "owner_id", "id"))
        .order_by("id", SortDirection::Asc)
        .build();
    let rows = tasks.find_as::<TaskWithOwner>(&options).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "t1");
    let owner = rows[0].owner.as_ref().unwrap();
    assert_eq!((owner.id.as_str(), owner.name.as_str()), ("u1", "Ada"));
    assert_eq!(rows[1].id, "t2");
    assert!(rows[1].owner.is_none());
}

#[tokio::test]
async fn filters_and_ordering_reach_joined_columns() {
    let store = DataStore::new(MemoryStore::new());
    let users = store.service::<User>(ServiceConfig::default()).unwrap();
    let tasks = store.service::<Task>(soft_config()).unwrap();

    for (id, name) in [("u1", "Ada"), ("u2", "Bob")] {
        users
            .create(NewUser { id: id.into(), name: name.into() }, &NoHooks)
            .await
            .unwrap();
    }
    for (id, owner) in [("t1", "u2"), ("t2", "u1"), ("t3", "u2")] {
        tasks
            .create(NewTask::new(id, "task", "acme").owned_by(owner), &NoHooks)
            .await
            .unwrap();
    }

    let options = QueryOptions::builder()
        .relation(Join::inner("users", "owner", "owner_id", "id"))
        .order_by("owner.name", SortDirection::Desc)
        .order_by("id", SortDirection::Asc)
        .custom(Filter::ne("id", "t3"))
        .build();

    assert_eq!(ids(&tasks.find(&options).await.unwrap()), vec!["t1", "t2"]);
}

#[tokio::test]
async fn parse_hook_reshapes_rows() {
    let store = DataStore::new(MemoryStore::new());
    let tasks = store.service::<Task>(soft_config()).unwrap();
    tasks
        .create(NewTask::new("t1", "lower", "acme"), &NoHooks)
        .await
        .unwrap();

    let options = QueryOptions::builder()
        .parse(|mut row| {
            let title = row.get_str("title").unwrap_or_default().to_uppercase();
            row.insert("title", title);
            row
        })
        .build();

    assert_eq!(tasks.find_first(&options).await.unwrap().unwrap().title, "LOWER");
}

#[tokio::test]
async fn runtime_selected_backend() {
    let store = DataStore::new(MemoryStore::new()).into_dyn();
    let tasks = store.service::<Task>(soft_config()).unwrap();

    tasks
        .create(NewTask::new("t1", "task", "acme"), &NoHooks)
        .await
        .unwrap();

    assert!(tasks.find_one("t1", &QueryOptions::new()).await.unwrap().is_some());
    assert!(store.downcast_backend::<MemoryStore>().is_some());
    assert_eq!(store.list_tables().await.unwrap(), vec!["tasks"]);
}
