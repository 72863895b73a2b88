//! Progress Aggregation Tests
//!
//! Integration tests for recomputing ancestor progress.
//!
//! ## Test Coverage
//! - Parent progress is the floor mean of its direct children
//! - Updates walk the whole ancestor chain and the root is written last
//! - A failure higher up keeps the writes already made below it
//! - Concurrent sibling updates resolve as last-writer-wins on read
//! - Creating and deleting sub-plans re-aggregates the parent
//! - Manual progress on a plan with sub-plans is rejected

mod support;

#[cfg(test)]
mod progress_aggregation_tests {
    use std::sync::Arc;

    use anyhow::Result;
    use lifeplan_core::db::{InMemoryBlobStore, InMemoryTreeStore, TreeStore};
    use lifeplan_core::models::{NewPlan, PlanNode, PlanPatch, ValidationError};
    use lifeplan_core::services::{
        PlanService, PlanServiceError, ProgressAggregationEngine, ProgressChange,
    };
    use tokio::sync::oneshot;

    use crate::support::{FaultyTreeStore, GatedTreeStore};

    const OWNER: &str = "owner-1";

    fn service_over(store: Arc<dyn TreeStore>) -> PlanService {
        PlanService::new(store, Arc::new(InMemoryBlobStore::new()))
    }

    async fn progress_of(store: &dyn TreeStore, id: &str) -> Result<u8> {
        Ok(store
            .get_node(OWNER, id)
            .await?
            .map(|n| n.progress)
            .unwrap_or_default())
    }

    #[tokio::test]
    async fn test_root_with_two_children_averages() -> Result<()> {
        let store = Arc::new(InMemoryTreeStore::new());
        let service = service_over(store.clone());

        let root = service.create_plan(OWNER, NewPlan::titled("R")).await?;
        assert_eq!(root.progress, 0);

        let a = service
            .create_child(OWNER, &root.id, NewPlan::titled("A").with_progress(40))
            .await?;
        service
            .create_child(OWNER, &root.id, NewPlan::titled("B").with_progress(60))
            .await?;
        assert_eq!(progress_of(store.as_ref(), &root.id).await?, 50);

        // Former parent is recomputed from the remaining child
        let deletion = service.delete_plan(OWNER, &a.id).await?;
        assert_eq!(progress_of(store.as_ref(), &root.id).await?, 60);
        assert_eq!(
            deletion.ancestors,
            vec![ProgressChange {
                node_id: root.id.clone(),
                progress: 60
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_derived_progress_cannot_be_set_by_hand() -> Result<()> {
        let store = Arc::new(FaultyTreeStore::new());
        let service = service_over(store.clone());

        let root = service.create_plan(OWNER, NewPlan::titled("R")).await?;
        let a = service
            .create_child(OWNER, &root.id, NewPlan::titled("A").with_progress(40))
            .await?;
        service
            .create_child(OWNER, &root.id, NewPlan::titled("B").with_progress(60))
            .await?;
        store.take_writes().await;

        let err = service.set_progress(OWNER, &root.id, 90).await.unwrap_err();
        assert!(matches!(
            err,
            PlanServiceError::Validation(ValidationError::DerivedProgress(ref id)) if *id == root.id
        ));

        let patch: PlanPatch = serde_json::from_value(serde_json::json!({
            "title": "Renamed",
            "progress": 5
        }))?;
        let err = service.update_plan(OWNER, &root.id, patch).await.unwrap_err();
        assert!(matches!(
            err,
            PlanServiceError::Validation(ValidationError::DerivedProgress(_))
        ));

        // Nothing was written; the parent still holds its children's mean
        assert!(store.take_writes().await.is_empty());
        let stored = service.get_plan(OWNER, &root.id).await?;
        assert_eq!(stored.progress, 50);
        assert_eq!(stored.title, "R");

        // Leaves still accept manual progress, and the parent follows
        service.set_progress(OWNER, &a.id, 80).await?;
        assert_eq!(progress_of(&store.inner, &root.id).await?, 70);

        // Non-progress edits on the parent are unaffected
        let patch: PlanPatch = serde_json::from_value(serde_json::json!({ "title": "Renamed" }))?;
        assert_eq!(service.update_plan(OWNER, &root.id, patch).await?.progress, 70);
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_is_floor_mean_after_any_child_update() -> Result<()> {
        let store = Arc::new(InMemoryTreeStore::new());
        let service = service_over(store.clone());

        let parent = service.create_plan(OWNER, NewPlan::titled("P")).await?;
        let values = [10u8, 25, 33, 90, 0];
        let mut children = Vec::new();
        for (i, value) in values.iter().enumerate() {
            let child = service
                .create_child(
                    OWNER,
                    &parent.id,
                    NewPlan::titled(format!("c{}", i)).with_progress(*value),
                )
                .await?;
            children.push(child);
        }
        // (10 + 25 + 33 + 90 + 0) / 5 = 31.6
        assert_eq!(progress_of(store.as_ref(), &parent.id).await?, 31);

        let outcome = service.set_progress(OWNER, &children[4].id, 77).await?;
        assert_eq!(outcome.plan.progress, 77);
        // (10 + 25 + 33 + 90 + 77) / 5 = 47
        assert_eq!(progress_of(store.as_ref(), &parent.id).await?, 47);
        assert_eq!(outcome.ancestors.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_four_level_chain_writes_root_last() -> Result<()> {
        let store = Arc::new(FaultyTreeStore::new());
        let service = service_over(store.clone());

        let root = service.create_plan(OWNER, NewPlan::titled("root")).await?;
        let a = service.create_child(OWNER, &root.id, NewPlan::titled("A")).await?;
        let b = service.create_child(OWNER, &a.id, NewPlan::titled("B")).await?;
        let c = service.create_child(OWNER, &b.id, NewPlan::titled("C")).await?;
        service
            .create_child(OWNER, &a.id, NewPlan::titled("B2").with_progress(20))
            .await?;
        store.take_writes().await;

        let outcome = service.set_progress(OWNER, &c.id, 80).await?;

        assert_eq!(
            store.take_writes().await,
            vec![c.id.clone(), b.id.clone(), a.id.clone(), root.id.clone()]
        );
        let written: Vec<(String, u8)> = outcome
            .ancestors
            .iter()
            .map(|change| (change.node_id.clone(), change.progress))
            .collect();
        // B has only C; A averages B(80) and B2(20); root has only A
        assert_eq!(
            written,
            vec![(b.id.clone(), 80), (a.id.clone(), 50), (root.id.clone(), 50)]
        );
        assert_eq!(progress_of(&store.inner, &root.id).await?, 50);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_higher_up_keeps_lower_writes() -> Result<()> {
        let store = Arc::new(FaultyTreeStore::new());
        let service = service_over(store.clone());

        let root = service.create_plan(OWNER, NewPlan::titled("root")).await?;
        let a = service.create_child(OWNER, &root.id, NewPlan::titled("A")).await?;
        let b = service.create_child(OWNER, &a.id, NewPlan::titled("B")).await?;
        store.fail_update_of(&root.id).await;

        let err = service.set_progress(OWNER, &b.id, 90).await.unwrap_err();

        assert!(matches!(
            err,
            PlanServiceError::ExternalService { operation: "update_fields", .. }
        ));
        assert_eq!(err.node_id(), Some(root.id.as_str()));
        assert_eq!(progress_of(&store.inner, &b.id).await?, 90);
        assert_eq!(progress_of(&store.inner, &a.id).await?, 90);
        assert_eq!(progress_of(&store.inner, &root.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_sibling_updates_last_writer_wins() -> Result<()> {
        let inner = Arc::new(InMemoryTreeStore::new());
        let parent = inner
            .insert_node(PlanNode::new_root(OWNER, NewPlan::titled("P"), 0))
            .await?;
        let a = inner
            .insert_node(PlanNode::new_child(&parent, NewPlan::titled("A"), 0))
            .await?;
        let b = inner
            .insert_node(PlanNode::new_child(&parent, NewPlan::titled("B"), 1))
            .await?;

        let (release, gate) = oneshot::channel();
        let store = Arc::new(GatedTreeStore::new(inner.clone(), parent.id.clone(), gate));
        let service = Arc::new(service_over(store.clone()));

        // First update reads A=100, B=0 and stalls before writing P=50
        let first = {
            let service = service.clone();
            let a_id = a.id.clone();
            tokio::spawn(async move { service.set_progress(OWNER, &a_id, 100).await })
        };
        store.wait_until_held().await;

        // Second update reads A=100, B=100 and writes P=100
        service.set_progress(OWNER, &b.id, 100).await?;
        assert_eq!(progress_of(inner.as_ref(), &parent.id).await?, 100);

        // The stalled write lands last and wins with its stale average
        let _ = release.send(());
        first.await??;
        assert_eq!(progress_of(inner.as_ref(), &parent.id).await?, 50);
        Ok(())
    }

    #[tokio::test]
    async fn test_levels_strictly_increase_along_every_chain() -> Result<()> {
        let store = Arc::new(InMemoryTreeStore::new());
        let service = service_over(store.clone());

        let mut current = service.create_plan(OWNER, NewPlan::titled("L1")).await?;
        for depth in 2..=6 {
            current = service
                .create_child(OWNER, &current.id, NewPlan::titled(format!("L{}", depth)))
                .await?;
            assert_eq!(current.level, depth);
        }

        let mut node = current;
        while let Some(parent_id) = node.parent_id.clone() {
            let parent = store.get_node(OWNER, &parent_id).await?.expect("parent exists");
            assert!(parent.level < node.level);
            node = parent;
        }
        assert_eq!(node.level, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_chain_is_integrity_error() -> Result<()> {
        let store = Arc::new(InMemoryTreeStore::new());
        let mut x = PlanNode::new_root(OWNER, NewPlan::titled("X"), 0);
        let mut y = PlanNode::new_root(OWNER, NewPlan::titled("Y"), 1);
        // Two rows pointing at each other, as only outside corruption could produce
        x.parent_id = Some(y.id.clone());
        y.parent_id = Some(x.id.clone());
        x.level = 2;
        y.level = 3;
        store.insert_node(x.clone()).await?;
        store.insert_node(y).await?;

        let engine = ProgressAggregationEngine::new(store.clone());
        let err = engine.propagate_from(OWNER, &x.id).await.unwrap_err();

        assert!(matches!(err, PlanServiceError::Integrity { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_owner_sees_nothing() -> Result<()> {
        let store = Arc::new(InMemoryTreeStore::new());
        let service = service_over(store.clone());
        let root = service.create_plan(OWNER, NewPlan::titled("Mine")).await?;

        let err = service
            .create_child("intruder", &root.id, NewPlan::titled("Sneaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanServiceError::NotFound { .. }));

        let err = service.set_progress("intruder", &root.id, 10).await.unwrap_err();
        assert!(matches!(err, PlanServiceError::NotFound { .. }));
        assert!(service.list_plans("intruder").await?.is_empty());
        Ok(())
    }
}
