//! Lifecycle scenarios against in-process fakes.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use stackpilot_core::CloudCredentials;
use stackpilot_scaling::{DeployRequest, ScaleOutcome, ScalingError};
use stackpilot_state::{ScaleAction, Stack, StackContext, StackOutputs};

use common::{harness, harness_with, test_config};

async fn deployed(h: &common::Harness, count: u32) -> String {
    let result = h
        .orchestrator
        .deploy(DeployRequest::new("web", count))
        .await
        .unwrap();
    assert!(result.success, "deploy failed: {result:?}");
    h.clear_calls();
    result.stack_id
}

fn key_names(h: &common::Harness, stack_id: &str) -> Vec<String> {
    h.orchestrator
        .keypairs(stack_id)
        .unwrap()
        .into_iter()
        .map(|k| k.key_name)
        .collect()
}

#[tokio::test]
async fn deploy_scale_up_then_down() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;

    let stack = h.store.load(&stack_id).unwrap();
    assert_eq!(stack.declared_count(), 2);
    assert_eq!(key_names(&h, &stack_id), vec!["web-vm-1", "web-vm-2"]);
    assert_eq!(h.registry.registered(), vec!["web-vm-1", "web-vm-2"]);

    let up = h
        .orchestrator
        .scale(&stack_id, 4, Some("load".into()))
        .await
        .unwrap();
    assert_eq!(up.outcome, ScaleOutcome::Scaled);
    assert_eq!(up.action, ScaleAction::ScaleUp);
    assert_eq!(up.keypairs_added, vec!["web-vm-3", "web-vm-4"]);
    assert_eq!(h.provisioner.calls(), vec!["render 4", "apply"]);

    let stack = h.store.load(&stack_id).unwrap();
    assert_eq!(stack.declared_count(), 4);
    assert_eq!(stack.scaling_history.len(), 1);
    assert_eq!(stack.scaling_history[0].action, ScaleAction::ScaleUp);
    assert_eq!(stack.outputs.instance_ids.len(), 4);
    assert_eq!(stack.last_scale_reason.as_deref(), Some("load"));

    h.clear_calls();
    let down = h.orchestrator.scale(&stack_id, 1, None).await.unwrap();
    assert_eq!(down.outcome, ScaleOutcome::Scaled);
    assert_eq!(down.action, ScaleAction::ScaleDown);
    assert_eq!(down.keypairs_removed, vec!["web-vm-4", "web-vm-3", "web-vm-2"]);
    assert_eq!(h.registry.deleted(), vec!["web-vm-4", "web-vm-3", "web-vm-2"]);

    let stack = h.store.load(&stack_id).unwrap();
    assert_eq!(stack.declared_count(), 1);
    assert_eq!(stack.scaling_history.len(), 2);
    assert_eq!(key_names(&h, &stack_id), vec!["web-vm-1"]);
    assert_eq!(h.registry.registered(), vec!["web-vm-1"]);
}

#[tokio::test]
async fn scale_to_current_count_is_a_true_noop() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;

    for _ in 0..2 {
        let result = h.orchestrator.scale(&stack_id, 2, None).await.unwrap();
        assert_eq!(result.action, ScaleAction::NoChange);
        assert_eq!(result.outcome, ScaleOutcome::Unchanged);
        assert!(result.is_success());
    }
    assert!(h.registry.calls().is_empty());
    assert!(h.provisioner.calls().is_empty());
    assert!(h.store.load(&stack_id).unwrap().scaling_history.is_empty());
}

#[tokio::test]
async fn out_of_bounds_targets_are_rejected_without_side_effects() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;

    for target in [0, 11, 500] {
        let err = h.orchestrator.scale(&stack_id, target, None).await.unwrap_err();
        assert!(matches!(err, ScalingError::InvalidArgument(_)), "{err}");
    }
    assert!(h.registry.calls().is_empty());
    assert!(h.provisioner.calls().is_empty());
    assert_eq!(h.store.load(&stack_id).unwrap().declared_count(), 2);
}

#[tokio::test]
async fn unknown_stack_is_not_found() {
    let h = harness();
    let err = h
        .orchestrator
        .scale("20250101000000-deadbeef", 2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScalingError::NotFound(_)));
}

#[tokio::test]
async fn keypair_failure_blocks_provisioning() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;
    h.registry
        .fail_import
        .lock()
        .unwrap()
        .insert("web-vm-4".to_string());

    let result = h.orchestrator.scale(&stack_id, 4, None).await.unwrap();
    let ScaleOutcome::KeypairFailed { errors } = &result.outcome else {
        panic!("expected keypair failure, got {:?}", result.outcome);
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("web-vm-4"));
    assert_eq!(result.keypairs_added, vec!["web-vm-3"]);

    assert!(h.provisioner.calls().is_empty());
    let stack = h.store.load(&stack_id).unwrap();
    assert_eq!(stack.declared_count(), 2);
    assert!(stack.scaling_history.is_empty());

    // Retry converges once the registry recovers.
    h.registry.fail_import.lock().unwrap().clear();
    let retry = h.orchestrator.scale(&stack_id, 4, None).await.unwrap();
    assert_eq!(retry.outcome, ScaleOutcome::Scaled);
    assert_eq!(h.store.load(&stack_id).unwrap().declared_count(), 4);
}

#[tokio::test]
async fn partial_keypair_removal_blocks_provisioning() {
    let h = harness();
    let stack_id = deployed(&h, 3).await;
    h.registry
        .fail_delete
        .lock()
        .unwrap()
        .insert("web-vm-3".to_string());

    let result = h.orchestrator.scale(&stack_id, 1, None).await.unwrap();
    let ScaleOutcome::KeypairFailed { errors } = &result.outcome else {
        panic!("expected keypair failure, got {:?}", result.outcome);
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("web-vm-3"));
    assert!(result.keypairs_removed.is_empty());
    assert_eq!(h.registry.deleted(), vec!["web-vm-3"]);
    assert!(h.provisioner.calls().is_empty());
    assert_eq!(h.store.load(&stack_id).unwrap().declared_count(), 3);
    assert!(h.registry.registered().contains(&"web-vm-2".to_string()));
    assert!(key_names(&h, &stack_id).contains(&"web-vm-2".to_string()));
}

#[tokio::test]
async fn smaller_scale_down_after_failed_removal_keeps_declared_keys() {
    let h = harness();
    let stack_id = deployed(&h, 3).await;
    h.registry
        .fail_delete
        .lock()
        .unwrap()
        .insert("web-vm-3".to_string());
    let failed = h.orchestrator.scale(&stack_id, 1, None).await.unwrap();
    assert!(!failed.is_success());

    h.registry.fail_delete.lock().unwrap().clear();
    let result = h.orchestrator.scale(&stack_id, 2, None).await.unwrap();
    assert_eq!(result.outcome, ScaleOutcome::Scaled);
    assert_eq!(result.keypairs_removed, vec!["web-vm-3"]);

    assert_eq!(h.store.load(&stack_id).unwrap().declared_count(), 2);
    assert_eq!(h.registry.registered(), vec!["web-vm-1", "web-vm-2"]);
    assert_eq!(key_names(&h, &stack_id), vec!["web-vm-1", "web-vm-2"]);
}

#[tokio::test]
async fn apply_failure_leaves_declared_state() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;
    let before = h.store.load(&stack_id).unwrap();
    h.provisioner.fail_apply.store(true, Ordering::SeqCst);

    let result = h.orchestrator.scale(&stack_id, 3, None).await.unwrap();
    assert_eq!(
        result.outcome,
        ScaleOutcome::ProvisionFailed {
            phase: "FAILED_APPLY".into()
        }
    );
    assert_eq!(result.old_count, 2);
    assert_eq!(result.target_count, 3);
    assert!(result.logs["apply"].contains("quota"));
    assert_eq!(h.store.load(&stack_id).unwrap(), before);
}

#[tokio::test]
async fn missing_credentials_fail_before_keypairs() {
    let mut config = test_config();
    config.credentials = CloudCredentials::default();
    let h = harness_with(config);

    let context = StackContext {
        region: "us-east-1".into(),
        az: "us-east-1a".into(),
        vpc_cidr: "10.0.0.0/16".into(),
        subnet_cidr: "10.0.1.0/24".into(),
        name_prefix: "web".into(),
        instance_count: 1,
        ami: "ami-1".into(),
        instance_type: "t3.micro".into(),
        user_data_path: "u.sh".into(),
    };
    let stack = Stack::new("20250101000000-cafebabe", context, StackOutputs::default());
    h.store.save(&stack).unwrap();

    let err = h
        .orchestrator
        .scale(&stack.stack_id, 2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScalingError::Credential(_)));
    assert!(h.registry.calls().is_empty());

    // A no-op never needs credentials.
    assert!(h.orchestrator.scale(&stack.stack_id, 1, None).await.is_ok());

    let err = h
        .orchestrator
        .deploy(DeployRequest::new("web", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ScalingError::Credential(_)));
}

#[tokio::test]
async fn concurrent_scales_on_one_stack_are_serialized() {
    let h = harness();
    let stack_id = deployed(&h, 1).await;
    *h.provisioner.apply_delay.lock().unwrap() = Duration::from_millis(150);

    let a = {
        let orchestrator = h.orchestrator.clone();
        let id = stack_id.clone();
        tokio::spawn(async move { orchestrator.scale(&id, 3, None).await })
    };
    let b = {
        let orchestrator = h.orchestrator.clone();
        let id = stack_id.clone();
        tokio::spawn(async move { orchestrator.scale(&id, 5, None).await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert!(a.is_success() && b.is_success());

    let stack = h.store.load(&stack_id).unwrap();
    let history = &stack.scaling_history;
    assert_eq!(history.len(), 2);
    // The second operation observed the first one's committed count.
    assert_eq!(history[1].old_count, history[0].new_count);
    assert_eq!(stack.declared_count(), history[1].new_count);
    assert_eq!(key_names(&h, &stack_id).len() as u32, stack.declared_count());
}

#[tokio::test]
async fn failed_deploy_records_nothing() {
    let h = harness();
    h.provisioner.fail_init.store(true, Ordering::SeqCst);

    let result = h
        .orchestrator
        .deploy(DeployRequest::new("web", 2))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.phase, "FAILED_INIT");
    assert!(result.logs["init"].contains("provider"));
    assert!(result.stack.is_none());
    assert!(h.orchestrator.list().unwrap().is_empty());
}

#[tokio::test]
async fn deploy_rejects_bad_requests() {
    let h = harness();
    for req in [DeployRequest::new("web", 0), DeployRequest::new("web", 11), DeployRequest::new("bad prefix", 1)] {
        let err = h.orchestrator.deploy(req).await.unwrap_err();
        assert!(matches!(err, ScalingError::InvalidArgument(_)));
    }
    assert!(h.provisioner.calls().is_empty());
}

#[tokio::test]
async fn teardown_removes_everything() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;

    let result = h.orchestrator.teardown(&stack_id).await.unwrap();
    assert!(result.destroyed);
    let cleanup = result.keypairs.unwrap();
    assert_eq!(cleanup.deleted, vec!["web-vm-1", "web-vm-2"]);
    assert!(cleanup.errors.is_empty());
    assert!(!h.store.namespace_exists(&stack_id));
    assert!(h.registry.registered().is_empty());

    let err = h.orchestrator.teardown(&stack_id).await.unwrap_err();
    assert!(matches!(err, ScalingError::NotFound(_)));
}

#[tokio::test]
async fn failed_destroy_keeps_local_state() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;
    h.provisioner.fail_destroy.store(true, Ordering::SeqCst);

    let result = h.orchestrator.teardown(&stack_id).await.unwrap();
    assert!(!result.destroyed);
    assert!(result.keypairs.is_none());
    assert!(h.store.load(&stack_id).is_ok());
    assert_eq!(key_names(&h, &stack_id).len(), 2);
}

#[tokio::test]
async fn describe_reports_slots_and_live_outputs() {
    let h = harness();
    let stack_id = deployed(&h, 2).await;

    let description = h.orchestrator.describe(&stack_id).await.unwrap();
    assert_eq!(description.slots.len(), 2);
    assert_eq!(description.slots[1].key_name, "web-vm-2");
    assert_eq!(description.slots[1].instance_id.as_deref(), Some("i-0002"));
    assert_eq!(description.live_outputs.instance_ids.len(), 2);
}
