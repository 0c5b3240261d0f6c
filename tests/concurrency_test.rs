use futures::future::try_join_all;
use placenet::config::{CommissionPlan, Config};
use placenet::db::init_db;
use placenet::orchestration::{NetworkService, NewMember, NewOrder};
use placenet::{CoreError, Decimal, MemberId, Period, Repository, Slot, TimeMs};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn test_config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        commission_plan: CommissionPlan::default(),
        snapshot_max_depth: 6,
        team_batch_size: 500,
    }
}

async fn setup_service() -> (NetworkService, Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pools = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pools));
    let service = NetworkService::new(Arc::clone(&repo), test_config());
    (service, repo, temp_dir)
}

fn root_request(member: &str) -> NewMember {
    NewMember {
        member_id: MemberId::new(member.to_string()),
        sponsor_id: None,
        position: None,
        spillover: false,
    }
}

fn child_request(member: &str, sponsor: &str, slot: Slot) -> NewMember {
    NewMember {
        member_id: MemberId::new(member.to_string()),
        sponsor_id: Some(MemberId::new(sponsor.to_string())),
        position: Some(slot),
        spillover: false,
    }
}

fn spillover_request(member: &str, sponsor: &str) -> NewMember {
    NewMember {
        member_id: MemberId::new(member.to_string()),
        sponsor_id: Some(MemberId::new(sponsor.to_string())),
        position: None,
        spillover: true,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_orders_never_lose_volume() {
    let (service, repo, _temp) = setup_service().await;
    service.place_member(root_request("root")).await.unwrap();
    service
        .place_member(child_request("a", "root", Slot::Left))
        .await
        .unwrap();
    service
        .place_member(child_request("b", "root", Slot::Right))
        .await
        .unwrap();

    let ten = Decimal::from_str_canonical("10").unwrap();
    let mut handles = Vec::new();
    for member in ["a", "b"] {
        for _ in 0..4 {
            let service = service.clone();
            let member_id = MemberId::new(member.to_string());
            handles.push(tokio::spawn(async move {
                service
                    .record_order(NewOrder {
                        member_id,
                        order_amount: ten,
                        commissionable_value: ten,
                    })
                    .await
            }));
        }
    }
    let receipts = try_join_all(handles).await.unwrap();
    assert!(receipts.iter().all(|r| r.is_ok()));

    // Writers serialize, so no delta is lost.
    let root = repo.root_node().await.unwrap().unwrap();
    assert_eq!(root.left_volume, Decimal::from_str_canonical("40").unwrap());
    assert_eq!(root.right_volume, Decimal::from_str_canonical("40").unwrap());
    assert_eq!(root.total_volume, Decimal::from_str_canonical("80").unwrap());

    let a = repo
        .get_node_by_member(&MemberId::new("a".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.own_volume, Decimal::from_str_canonical("40").unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_slot_race_has_one_winner() {
    let (service, _repo, _temp) = setup_service().await;
    service.place_member(root_request("root")).await.unwrap();

    let mut handles = Vec::new();
    for member in ["x", "y"] {
        let service = service.clone();
        let request = child_request(member, "root", Slot::Left);
        handles.push(tokio::spawn(async move {
            service.place_member(request).await
        }));
    }
    let outcomes = try_join_all(handles).await.unwrap();

    let winners = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(err, CoreError::SlotOccupied { .. }));
        }
    }

    let size = service
        .team_size(&MemberId::new("root".into()))
        .await
        .unwrap();
    assert_eq!(size, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spillover_fills_distinct_slots() {
    let (service, _repo, _temp) = setup_service().await;
    service.place_member(root_request("root")).await.unwrap();

    let mut handles = Vec::new();
    for member in ["s1", "s2", "s3"] {
        let service = service.clone();
        let request = spillover_request(member, "root");
        handles.push(tokio::spawn(async move {
            service.place_member(request).await
        }));
    }
    let outcomes = try_join_all(handles).await.unwrap();

    // Every loser rescans and lands somewhere else; nobody gives up.
    let mut taken = HashSet::new();
    let mut levels = Vec::new();
    for outcome in outcomes {
        let node = outcome.unwrap();
        assert!(taken.insert((node.parent_id, node.position)));
        levels.push(node.level);
    }
    levels.sort();
    assert_eq!(levels, [1, 1, 2]);

    let size = service
        .team_size(&MemberId::new("root".into()))
        .await
        .unwrap();
    assert_eq!(size, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_evaluation_inserts_once() {
    let (service, _repo, _temp) = setup_service().await;
    service.place_member(root_request("root")).await.unwrap();
    service
        .place_member(child_request("a", "root", Slot::Left))
        .await
        .unwrap();
    service
        .place_member(child_request("c", "a", Slot::Left))
        .await
        .unwrap();
    let amount = Decimal::from_str_canonical("200").unwrap();
    service
        .record_order(NewOrder {
            member_id: MemberId::new("c".into()),
            order_amount: amount,
            commissionable_value: amount,
        })
        .await
        .unwrap();

    let period = Period::from_time(TimeMs::now());
    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .evaluate(&MemberId::new("a".into()), period.year, period.month)
                .await
        }));
    }
    let outcomes = try_join_all(handles).await.unwrap();

    let mut inserted = 0;
    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.candidates, 1);
        inserted += outcome.inserted;
    }
    assert_eq!(inserted, 1);

    let records = service
        .list_commissions(Some(&MemberId::new("a".into())), None, None, None)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}
