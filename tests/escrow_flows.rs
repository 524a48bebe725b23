//! End-to-end escrow lifecycle flows against an `EscrowNode`

use escrow_ledger::{
    escrow_manager::{AddPaymentRequest, CreateEscrowRequest},
    models::{EscrowStatus, PaymentStatus},
    node::{EscrowNode, EscrowNodeConfig, MemorySources},
};

const ADMIN: &str = "deployer";
const CLIENT: &str = "client_c1";
const CONTRACTOR: &str = "contractor_c2";

fn memory_node() -> (EscrowNode, MemorySources) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    EscrowNode::with_memory_sources(EscrowNodeConfig::default(), ADMIN)
}

fn escrow_request(escrow_id: &str, total_amount: u64) -> CreateEscrowRequest {
    CreateEscrowRequest {
        escrow_id: escrow_id.to_string(),
        project_id: "p1".to_string(),
        contractor: CONTRACTOR.to_string(),
        total_amount,
    }
}

fn payment_request(escrow_id: &str, payment_id: &str, amount: u64) -> AddPaymentRequest {
    AddPaymentRequest {
        escrow_id: escrow_id.to_string(),
        payment_id: payment_id.to_string(),
        milestone_id: "m1".to_string(),
        inspection_id: None,
        amount,
    }
}

#[tokio::test]
async fn escrow_creation_starts_active_and_unreleased() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;

    let escrow = node.get_escrow("e1").await.expect("escrow stored");
    assert_eq!(escrow.status, EscrowStatus::Active);
    assert_eq!(escrow.released_amount, 0);
    assert_eq!(escrow.client, CLIENT);
    assert_eq!(escrow.contractor, CONTRACTOR);

    Ok(())
}

#[tokio::test]
async fn released_payment_moves_funds_exactly_once() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    node.add_payment(CLIENT, payment_request("e1", "pay1", 20_000)).await?;
    node.release_payment(CLIENT, "e1", "pay1").await?;

    assert_eq!(node.get_escrow("e1").await.unwrap().released_amount, 20_000);
    let payment = node.get_payment("e1", "pay1").await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Released);
    assert!(payment.release_marker.is_some());

    // Second release fails InvalidState and the amount counts exactly once
    let err = node.release_payment(CLIENT, "e1", "pay1").await.unwrap_err();
    assert_eq!(err.code(), 104);
    assert_eq!(node.get_escrow("e1").await.unwrap().released_amount, 20_000);

    let audit = node.audit_escrow("e1").await?;
    assert!(audit.consistent);
    assert_eq!(audit.released_sum, 20_000);

    Ok(())
}

#[tokio::test]
async fn contractor_cannot_release_funds_to_itself() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    node.add_payment(CLIENT, payment_request("e1", "pay1", 20_000)).await?;

    let err = node
        .release_payment(CONTRACTOR, "e1", "pay1")
        .await
        .unwrap_err();
    assert_eq!(err.code(), 100);
    assert_eq!(
        node.get_payment("e1", "pay1").await.unwrap().status,
        PaymentStatus::Pending
    );

    Ok(())
}

#[tokio::test]
async fn dispute_freezes_until_admin_resolution() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    node.add_payment(CLIENT, payment_request("e1", "pay1", 20_000)).await?;

    // Contractor raises the dispute
    let disputed = node.dispute_escrow(CONTRACTOR, "e1").await?;
    assert_eq!(disputed.status, EscrowStatus::Disputed);

    // Frozen: no payment activity while disputed
    assert_eq!(
        node.release_payment(CLIENT, "e1", "pay1").await.unwrap_err().code(),
        104
    );
    assert_eq!(
        node.add_payment(CLIENT, payment_request("e1", "pay2", 5_000))
            .await
            .unwrap_err()
            .code(),
        104
    );

    // Only the admin resolves
    let err = node
        .resolve_dispute(CLIENT, "e1", EscrowStatus::Active)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 100);

    let resumed = node.resolve_dispute(ADMIN, "e1", EscrowStatus::Active).await?;
    assert_eq!(resumed.status, EscrowStatus::Active);

    // Business as usual after resumption
    node.release_payment(CLIENT, "e1", "pay1").await?;
    assert_eq!(node.get_escrow("e1").await.unwrap().released_amount, 20_000);

    Ok(())
}

#[tokio::test]
async fn closed_escrow_is_immutable_history() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    node.close_escrow(CLIENT, "e1").await?;

    let err = node
        .add_payment(CLIENT, payment_request("e1", "pay2", 1_000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 104);

    // No transition out of Closed, not even for the admin
    assert_eq!(node.dispute_escrow(CLIENT, "e1").await.unwrap_err().code(), 104);
    assert_eq!(node.close_escrow(ADMIN, "e1").await.unwrap_err().code(), 104);

    Ok(())
}

#[tokio::test]
async fn milestone_gated_release_follows_verification_facts() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = EscrowNodeConfig {
        manager: escrow_ledger::escrow_manager::EscrowManagerConfig {
            require_verified_milestone: true,
            ..Default::default()
        },
    };
    let (node, sources) = EscrowNode::with_memory_sources(config, ADMIN);

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    node.add_payment(CLIENT, payment_request("e1", "pay1", 20_000)).await?;

    let err = node.release_payment(CLIENT, "e1", "pay1").await.unwrap_err();
    assert_eq!(err.code(), 104);

    sources
        .milestones
        .set_milestone(
            "p1",
            "m1",
            escrow_ledger::collaborators::MilestoneFact {
                completed: true,
                verified: true,
                payment_percentage: 20,
            },
        )
        .await;

    let released = node.release_payment(CLIENT, "e1", "pay1").await?;
    assert_eq!(released.status, PaymentStatus::Released);

    Ok(())
}

#[tokio::test]
async fn audit_trail_orders_releases_by_marker() -> anyhow::Result<()> {
    let (node, _) = memory_node();

    node.create_escrow(CLIENT, escrow_request("e1", 100_000)).await?;
    for (id, amount) in [("pay1", 10_000), ("pay2", 20_000)] {
        node.add_payment(CLIENT, payment_request("e1", id, amount)).await?;
    }
    let first = node.release_payment(CLIENT, "e1", "pay1").await?;
    let second = node.release_payment(ADMIN, "e1", "pay2").await?;

    assert!(first.release_marker.unwrap() < second.release_marker.unwrap());

    let events = node.get_escrow_events("e1").await;
    let releases: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "payment.released")
        .collect();
    assert_eq!(releases.len(), 2);
    assert_eq!(releases[0].payment_id.as_deref(), Some("pay1"));
    assert_eq!(releases[1].payment_id.as_deref(), Some("pay2"));

    Ok(())
}
