use chrono::NaiveDate;
use domain::{
    Expense, ExpenseInput, ExpenseStatus, FieldMap, FormState, Priority, Record, RecordId, Task,
    TaskInput, TaskStatus,
};
use infrastructure::{
    ApiOperation, GraphQlClient, ImageResolver, InMemoryObjectStorage, InMemoryRecordApi,
    RecordApi, RecordStore, RefreshOutcome,
};
use serde_json::json;
use shared::{AppError, Config, SyncStrategy};
use std::sync::Arc;
use tokio::time::Duration;

/// テスト用のストアを作成
fn task_store() -> (Arc<InMemoryRecordApi<Task>>, RecordStore<Task>) {
    let api = Arc::new(InMemoryRecordApi::<Task>::new("test_user"));
    let store = RecordStore::new(api.clone());
    (api, store)
}

fn expense_store() -> (Arc<InMemoryRecordApi<Expense>>, RecordStore<Expense>) {
    let api = Arc::new(InMemoryRecordApi::<Expense>::new("test_user"));
    let store = RecordStore::new(api.clone());
    (api, store)
}

/// 作成でコレクションが 1 件増え、入力値が保持されること
#[tokio::test]
async fn test_add_appends_record_with_fields() {
    let (_, store) = task_store();
    store.add(TaskInput::new("既存タスク")).await.unwrap();
    let before = store.len();

    let created = store
        .add(
            TaskInput::new("Buy milk")
                .with_description("2 本")
                .with_priority(Priority::High),
        )
        .await
        .unwrap();

    assert_eq!(store.len(), before + 1);
    assert_eq!(created.title, "Buy milk");
    assert_eq!(created.description.as_deref(), Some("2 本"));
    assert_eq!(created.priority, Some(Priority::High));
    // ステータス未指定は TODO
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(created.owner.as_deref(), Some("test_user"));
    assert_eq!(store.find(&created.id), Some(created));
}

/// 経費を追加すると合計が増えること
#[tokio::test]
async fn test_add_expense_updates_total() {
    let (_, store) = expense_store();
    store
        .add(ExpenseInput::new("Taxi", 30.0).with_category("TRANSPORT"))
        .await
        .unwrap();
    let before = store.total();

    let lunch = store
        .add(
            ExpenseInput::new("Lunch", 12.50)
                .with_category("FOOD")
                .with_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        )
        .await
        .unwrap();

    assert!((store.total() - (before + 12.5)).abs() < f64::EPSILON);
    assert_eq!(lunch.status, ExpenseStatus::Pending);
    assert_eq!(store.by_category("FOOD"), vec![lunch]);
    assert_eq!(store.by_category("TRANSPORT").len(), 1);
    assert!(store.by_category("RENT").is_empty());
}

/// 必須フィールドが欠けていればリモートを呼ばずに検証エラーになること
#[tokio::test]
async fn test_add_without_required_field_is_rejected_locally() {
    let (api, store) = task_store();
    store.add(TaskInput::new("既存タスク")).await.unwrap();

    let result = store.add(TaskInput::new("   ")).await;

    match result {
        Err(error @ AppError::Validation(_)) => {
            assert_eq!(error.user_message(), "title を入力してください");
        }
        other => panic!("検証エラーになるべき: {other:?}"),
    }
    assert_eq!(api.call_count(ApiOperation::Create), 1);
    assert_eq!(store.len(), 1);
}

/// 作成に失敗した場合はコレクションが変わらないこと
#[tokio::test]
async fn test_failed_create_leaves_collection_unchanged() {
    let (api, store) = task_store();
    store.add(TaskInput::new("既存タスク")).await.unwrap();
    let before = store.list();

    api.fail(ApiOperation::Create);
    let result = store.add(TaskInput::new("Buy milk")).await;

    assert!(matches!(result, Err(AppError::RemoteCall { .. })));
    assert!(result.unwrap_err().is_remote());
    assert_eq!(store.list(), before);
}

/// 削除したレコードがコレクションから消えること
#[tokio::test]
async fn test_remove_existing_record() {
    let (api, store) = task_store();
    let keep = store.add(TaskInput::new("残すタスク")).await.unwrap();
    let target = store.add(TaskInput::new("消すタスク")).await.unwrap();

    assert!(store.remove(&target.id).await.unwrap());

    assert_eq!(store.list(), vec![keep]);
    assert!(store.find(&target.id).is_none());
    assert_eq!(api.records().len(), 1);
}

/// 存在しないIDの削除はエラーにならず、コレクションも変わらないこと
#[tokio::test]
async fn test_remove_missing_record_is_noop() {
    let (_, store) = task_store();
    store.add(TaskInput::new("残すタスク")).await.unwrap();
    let before = store.list();

    let missing = RecordId::from_string("does-not-exist").unwrap();
    assert!(!store.remove(&missing).await.unwrap());
    assert_eq!(store.list(), before);
}

/// 削除のリモート失敗はコレクションを変えずにエラーを返すこと
#[tokio::test]
async fn test_failed_remove_keeps_record() {
    let (api, store) = task_store();
    let task = store.add(TaskInput::new("消えないタスク")).await.unwrap();
    api.fail(ApiOperation::Delete);

    assert!(store.remove(&task.id).await.is_err());
    assert_eq!(store.len(), 1);
}

/// ステータスを 2 回切り替えると元に戻ること
#[tokio::test]
async fn test_toggle_status_twice_restores() {
    let (_, store) = task_store();
    let task = store.add(TaskInput::new("Buy milk")).await.unwrap();

    let completed = store.toggle_status(&task).await.unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(store.find(&task.id).unwrap().is_completed());

    let restored = store.toggle_status(&completed).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Todo);
    assert_eq!(restored.title, task.title);
    assert_eq!(store.find(&task.id).unwrap().status, TaskStatus::Todo);
}

/// 経費のステータス切り替え
#[tokio::test]
async fn test_toggle_expense_status() {
    let (_, store) = expense_store();
    let expense = store
        .add(ExpenseInput::new("Rent", 800.0).with_category("HOUSING"))
        .await
        .unwrap();

    let paid = store.toggle_status(&expense).await.unwrap();
    assert!(paid.is_paid());
    assert_eq!(paid.amount, 800.0);
}

/// 部分更新は指定フィールドだけを変更すること
#[tokio::test]
async fn test_update_changes_only_given_fields() {
    let (_, store) = task_store();
    let task = store
        .add(TaskInput::new("Buy milk").with_priority(Priority::Low))
        .await
        .unwrap();

    let mut patch = FieldMap::new();
    patch.insert("title".to_string(), json!("Buy oat milk"));
    let updated = store.update(&task.id, patch).await.unwrap();

    assert_eq!(updated.title, "Buy oat milk");
    assert_eq!(updated.priority, Some(Priority::Low));
    assert_eq!(store.find(&task.id), Some(updated));
}

/// 存在しないレコードの更新は NotFound
#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let (_, store) = task_store();
    let missing = RecordId::from_string("does-not-exist").unwrap();

    let mut patch = FieldMap::new();
    patch.insert("title".to_string(), json!("x"));

    assert!(matches!(
        store.update(&missing, patch).await,
        Err(AppError::NotFound(_))
    ));
}

/// フォームから送信した内容が反映されること
#[tokio::test]
async fn test_submit_form_updates_record() {
    let (_, store) = expense_store();
    let expense = store
        .add(
            ExpenseInput::new("Lunch", 12.5)
                .with_category("FOOD")
                .with_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        )
        .await
        .unwrap();

    let mut form = FormState::from_record(&expense).unwrap();
    form.set("amount", "15.75").unwrap();
    form.set("notes", "同僚と").unwrap();

    let updated = store.submit(&expense.id, &mut form).await.unwrap();
    assert_eq!(updated.amount, 15.75);
    assert_eq!(updated.notes.as_deref(), Some("同僚と"));
    assert!((store.total() - 15.75).abs() < f64::EPSILON);
}

/// 不正なフォームは送信されないこと
#[tokio::test]
async fn test_submit_invalid_form_is_rejected() {
    let (api, store) = expense_store();
    let expense = store
        .add(
            ExpenseInput::new("Lunch", 12.5)
                .with_category("FOOD")
                .with_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        )
        .await
        .unwrap();

    let mut form = FormState::from_record(&expense).unwrap();
    form.set("name", "").unwrap();
    form.set("amount", "twelve").unwrap();

    let result = store.submit(&expense.id, &mut form).await;
    assert!(result.unwrap_err().is_validation());
    assert!(form.error("name").unwrap().has_error);
    assert!(form.error("amount").unwrap().has_error);
    assert_eq!(api.call_count(ApiOperation::Update), 0);
}

/// 再取得で他クライアントの書き込みも取り込まれること
#[tokio::test]
async fn test_refetch_picks_up_remote_changes() {
    let (api, store) = task_store();
    let other: Task = serde_json::from_value(json!({
        "id": "other-client",
        "title": "別端末のタスク",
        "status": "COMPLETED"
    }))
    .unwrap();
    api.insert_remote(other.clone());

    store.add(TaskInput::new("Buy milk")).await.unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.find(other.id()), Some(other));
}

/// Patch 戦略ではレスポンスで直接更新し、一覧を再取得しないこと
#[tokio::test]
async fn test_patch_strategy_updates_from_response() {
    let (api, store) = task_store();
    let store = store.with_strategy(SyncStrategy::Patch);

    let a = store.add(TaskInput::new("A")).await.unwrap();
    let b = store.add(TaskInput::new("B")).await.unwrap();
    let b = store.toggle_status(&b).await.unwrap();
    assert!(store.remove(&a.id).await.unwrap());

    assert_eq!(store.list(), vec![b]);
    assert_eq!(api.call_count(ApiOperation::List), 0);
}

/// 再取得に失敗してもミューテーションは成功扱いでレスポンスが反映されること
#[tokio::test]
async fn test_refetch_failure_falls_back_to_response() {
    let (api, store) = task_store();
    let existing = store.add(TaskInput::new("既存タスク")).await.unwrap();

    api.fail(ApiOperation::List);
    let toggled = store.toggle_status(&existing).await.unwrap();
    let created = store.add(TaskInput::new("Buy milk")).await.unwrap();

    assert_eq!(store.list(), vec![toggled, created]);
}

/// 遅れて届いた古い一覧は新しい状態を上書きしないこと
#[tokio::test]
async fn test_stale_refetch_is_discarded() {
    let (api, store) = task_store();
    store.add(TaskInput::new("A")).await.unwrap();

    // A だけの一覧を遅延させる
    api.set_list_delay(Duration::from_millis(100));
    let slow = store.refresh();

    let fast = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        api.set_list_delay(Duration::ZERO);
        store.add(TaskInput::new("B")).await
    };

    let (slow, fast) = tokio::join!(slow, fast);
    let b = fast.unwrap();

    assert_eq!(slow.unwrap(), RefreshOutcome::Stale);
    assert_eq!(store.len(), 2);
    assert_eq!(store.find(&b.id), Some(b));
    assert!(!store.is_loading());
}

/// 遅れて届いた一覧の破棄後に、古いレスポンスで新しい状態を上書きしないこと
#[tokio::test]
async fn test_stale_refetch_does_not_restore_older_response() {
    let (api, store) = task_store();
    let task = store.add(TaskInput::new("Buy milk")).await.unwrap();

    let title_patch = |title: &str| {
        let mut patch = FieldMap::new();
        patch.insert("title".to_string(), json!(title));
        patch
    };

    // 1 回目の更新後の一覧取得だけを遅延させる
    api.set_list_delay(Duration::from_millis(100));
    let first = store.update(&task.id, title_patch("x"));

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        api.set_list_delay(Duration::ZERO);
        store.update(&task.id, title_patch("y")).await
    };

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().title, "x");
    assert_eq!(second.unwrap().title, "y");

    let remote = api.records();
    assert_eq!(remote[0].title, "y");
    assert_eq!(store.find(&task.id).unwrap().title, "y");
    assert_eq!(store.list(), remote);
}

/// 並行したミューテーションがすべて反映されること
#[tokio::test]
async fn test_concurrent_adds_are_all_applied() {
    let (api, store) = task_store();

    let titles: Vec<String> = (0..5).map(|i| format!("タスク{i}")).collect();
    let results =
        futures::future::join_all(titles.iter().map(|t| store.add(TaskInput::new(t.clone()))))
            .await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(api.records().len(), 5);
    assert_eq!(store.len(), 5);
}

/// 画像付きレコードの削除で画像も削除されること
#[tokio::test]
async fn test_remove_cleans_up_receipt_image() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let images = ImageResolver::new(storage.clone(), "public/");
    let api = Arc::new(InMemoryRecordApi::<Expense>::new("test_user"));
    let store = RecordStore::new(api.clone()).with_image_cleanup(images.clone());

    let key = images
        .upload(vec![0xff, 0xd8, 0xff], "receipt.jpg", "image/jpeg")
        .await
        .unwrap();
    let expense = store
        .add(
            ExpenseInput::new("Lunch", 12.5)
                .with_category("FOOD")
                .with_receipt(key.clone()),
        )
        .await
        .unwrap();

    let url = images.resolve(expense.image_key()).await.unwrap();
    assert_eq!(storage.fetch(&url), Some(vec![0xff, 0xd8, 0xff]));

    assert!(store.remove(&expense.id).await.unwrap());
    assert!(!storage.contains(&images.path_for(&key).unwrap()));
    assert_eq!(images.resolve(Some(&key)).await, None);
}

/// 画像削除を有効にしなければ画像は残ること
#[tokio::test]
async fn test_remove_keeps_image_without_cleanup() {
    let storage = Arc::new(InMemoryObjectStorage::new());
    let images = ImageResolver::new(storage.clone(), "public/");
    let (_, store) = expense_store();

    let key = images
        .upload(vec![1, 2, 3], "receipt.png", "image/png")
        .await
        .unwrap();
    let expense = store
        .add(ExpenseInput::new("Lunch", 12.5).with_receipt(key.clone()))
        .await
        .unwrap();

    store.remove(&expense.id).await.unwrap();
    assert!(storage.contains(&images.path_for(&key).unwrap()));
}

fn graphql_config(endpoint: String) -> Config {
    Config::from_lookup(|key| match key {
        "GRAPHQL_ENDPOINT" => Some(endpoint.clone()),
        "GRAPHQL_API_KEY" => Some("da2-test".to_string()),
        _ => None,
    })
    .unwrap()
}

/// GraphQL 経由での作成と一覧取得
#[tokio::test]
async fn test_graphql_create_and_list() {
    let mut server = mockito::Server::new_async().await;
    let task = json!({
        "id": "01HQ3Z",
        "title": "Buy milk",
        "description": null,
        "status": "TODO",
        "priority": "HIGH",
        "createdAt": "2024-03-01T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z",
        "owner": "test_user"
    });

    let create = server
        .mock("POST", "/graphql")
        .match_header("x-api-key", "da2-test")
        .match_body(mockito::Matcher::PartialJson(json!({
            "variables": { "input": { "title": "Buy milk", "priority": "HIGH" } }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": { "createTask": task } }).to_string())
        .create_async()
        .await;

    let list = server
        .mock("POST", "/graphql")
        .match_body(mockito::Matcher::Regex("listTasks".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": { "listTasks": { "items": [task, null] } } }).to_string())
        .create_async()
        .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Task>()));

    let created = store
        .add(TaskInput::new("Buy milk").with_priority(Priority::High))
        .await
        .unwrap();

    assert_eq!(created.id.as_str(), "01HQ3Z");
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(store.list(), vec![created]);
    create.assert_async().await;
    list.assert_async().await;
}

/// GraphQL のエラー応答がリモートエラーとして返ること
#[tokio::test]
async fn test_graphql_errors_are_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/graphql")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": { "updateTask": null },
                "errors": [{ "message": "Not Authorized to access updateTask", "errorType": "Unauthorized" }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let api = client.records::<Task>();
    let id = RecordId::from_string("01HQ3Z").unwrap();

    let mut patch = FieldMap::new();
    patch.insert("status".to_string(), json!("COMPLETED"));

    match api.update(&id, &patch).await {
        Err(AppError::RemoteCall { operation, message }) => {
            assert_eq!(operation, "updateTask");
            assert_eq!(message, "Not Authorized to access updateTask");
        }
        other => panic!("リモートエラーになるべき: {other:?}"),
    }
}

/// 認証エラーのステータスは Authentication になること
#[tokio::test]
async fn test_graphql_unauthorized_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/graphql")
        .with_status(401)
        .create_async()
        .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Expense>()));

    assert!(matches!(
        store.refresh().await,
        Err(AppError::Authentication(_))
    ));
}

fn graphql_task() -> serde_json::Value {
    json!({
        "id": "01HQ3Z",
        "title": "Buy milk",
        "description": null,
        "status": "TODO",
        "priority": null,
        "createdAt": "2024-03-01T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z",
        "owner": "test_user"
    })
}

async fn mock_graphql(
    server: &mut mockito::Server,
    operation: &str,
    body: serde_json::Value,
) -> mockito::Mock {
    server
        .mock("POST", "/graphql")
        .match_body(mockito::Matcher::Regex(operation.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

fn conditional_check_failed(operation: &str) -> serde_json::Value {
    json!({
        "data": { operation: null },
        "errors": [{
            "message": "The conditional request failed",
            "errorType": "DynamoDB:ConditionalCheckFailedException"
        }]
    })
}

/// GraphQL 経由で 1 件取得できること、存在しなければ NotFound になること
#[tokio::test]
async fn test_graphql_get() {
    let mut server = mockito::Server::new_async().await;
    let found = mock_graphql(
        &mut server,
        "01HQ3Z",
        json!({ "data": { "getTask": graphql_task() } }),
    )
    .await;
    let _missing = mock_graphql(
        &mut server,
        "missing-id",
        json!({ "data": { "getTask": null } }),
    )
    .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Task>()));

    let task = store
        .get(&RecordId::from_string("01HQ3Z").unwrap())
        .await
        .unwrap();
    assert_eq!(task.title, "Buy milk");
    assert!(store.is_empty());

    assert!(matches!(
        store.get(&RecordId::from_string("missing-id").unwrap()).await,
        Err(AppError::NotFound(_))
    ));
    found.assert_async().await;
}

/// 既に削除済みのレコードの削除は、不在を確認した上でローカルからも除外されること
#[tokio::test]
async fn test_graphql_remove_already_deleted_record() {
    let mut server = mockito::Server::new_async().await;
    let _list = mock_graphql(
        &mut server,
        "listTasks",
        json!({ "data": { "listTasks": { "items": [graphql_task()] } } }),
    )
    .await;
    let _delete =
        mock_graphql(&mut server, "deleteTask", conditional_check_failed("deleteTask")).await;
    let _get = mock_graphql(&mut server, "getTask", json!({ "data": { "getTask": null } })).await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Task>()));
    store.refresh().await.unwrap();

    let id = RecordId::from_string("01HQ3Z").unwrap();
    assert!(store.remove(&id).await.unwrap());
    assert!(store.is_empty());

    // ローカルにも無い場合は false
    assert!(!store.remove(&id).await.unwrap());
}

/// 他の所有者のレコードへの削除は条件チェックで拒否され、ローカルのコピーは残ること
#[tokio::test]
async fn test_graphql_remove_rejected_for_existing_record() {
    let mut server = mockito::Server::new_async().await;
    let _list = mock_graphql(
        &mut server,
        "listTasks",
        json!({ "data": { "listTasks": { "items": [graphql_task()] } } }),
    )
    .await;
    let _delete =
        mock_graphql(&mut server, "deleteTask", conditional_check_failed("deleteTask")).await;
    let _get = mock_graphql(
        &mut server,
        "getTask",
        json!({ "data": { "getTask": graphql_task() } }),
    )
    .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Task>()));
    store.refresh().await.unwrap();

    let id = RecordId::from_string("01HQ3Z").unwrap();
    match store.remove(&id).await {
        Err(AppError::RemoteCall { operation, .. }) => assert_eq!(operation, "deleteTask"),
        other => panic!("リモートエラーになるべき: {other:?}"),
    }
    assert_eq!(store.len(), 1);
}

/// ファイル名由来の画像キーを持つレコードも一覧取得できること
#[tokio::test]
async fn test_graphql_list_accepts_file_name_image_keys() {
    let mut server = mockito::Server::new_async().await;
    let expense = |id: &str, key: &str| {
        json!({
            "id": id,
            "name": "Lunch",
            "amount": 12.5,
            "category": "FOOD",
            "notes": null,
            "date": "2024-03-01",
            "status": "PENDING",
            "receiptImageKey": key,
            "createdAt": "2024-03-01T00:00:00Z",
            "updatedAt": "2024-03-01T00:00:00Z",
            "owner": "test_user"
        })
    };
    let _list = mock_graphql(
        &mut server,
        "listExpenses",
        json!({ "data": { "listExpenses": { "items": [
            expense("e-1", "1700000000000-scan..final.png"),
            expense("e-2", "1700000000001-receipt.jpg")
        ] } } }),
    )
    .await;

    let client = GraphQlClient::new(&graphql_config(format!("{}/graphql", server.url())));
    let store = RecordStore::new(Arc::new(client.records::<Expense>()));

    assert_eq!(store.refresh().await.unwrap(), RefreshOutcome::Applied(2));
    let odd = store
        .find(&RecordId::from_string("e-1").unwrap())
        .unwrap();
    assert_eq!(
        odd.image_key().map(|k| k.as_str()),
        Some("1700000000000-scan..final.png")
    );
    assert!((store.total() - 25.0).abs() < f64::EPSILON);
}
