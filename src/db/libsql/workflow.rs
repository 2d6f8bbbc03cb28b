use libsql::params;
use uuid::Uuid;

use crate::db::{
    AppliedPhaseTransition, ApplyPhaseTransitionParams, CaseStore, CreateTransitionRuleParams,
    PhaseTransitionRuleRecord, PhaseTransitionStore, TaskTemplateItemRecord, TaskTemplateRecord,
    TaskTemplateWithItems, TemplateItemParams, UpdateTemplateItemParams,
    UpdateTransitionRuleParams, WorkflowTemplateStore,
};
use crate::error::DatabaseError;

use super::case_activity::{insert_case_event, insert_task};
use super::notices::insert_notice;
use super::{
    LibSqlBackend, get_i64, get_opt_text, get_text, now_ts, opt_uuid, parse_ts, parse_uuid,
    parse_uuid_opt,
};

const TEMPLATE_COLUMNS: &str = "id, name, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, task_template_id, description, due_date_offset_days, created_at, updated_at";
const RULE_COLUMNS: &str =
    "id, from_phase_id, to_phase_id, task_template_id, created_at, updated_at";

fn row_to_template_record(row: &libsql::Row) -> Result<TaskTemplateRecord, DatabaseError> {
    Ok(TaskTemplateRecord {
        id: parse_uuid(&get_text(row, 0), "task_templates.id")?,
        name: get_text(row, 1),
        created_at: parse_ts(&get_text(row, 2))?,
        updated_at: parse_ts(&get_text(row, 3))?,
    })
}

fn row_to_item_record(row: &libsql::Row) -> Result<TaskTemplateItemRecord, DatabaseError> {
    Ok(TaskTemplateItemRecord {
        id: parse_uuid(&get_text(row, 0), "task_template_items.id")?,
        task_template_id: parse_uuid(&get_text(row, 1), "task_template_items.task_template_id")?,
        description: get_text(row, 2),
        due_date_offset_days: get_i64(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

fn row_to_rule_record(row: &libsql::Row) -> Result<PhaseTransitionRuleRecord, DatabaseError> {
    Ok(PhaseTransitionRuleRecord {
        id: parse_uuid(&get_text(row, 0), "phase_transition_rules.id")?,
        from_phase_id: parse_uuid(&get_text(row, 1), "phase_transition_rules.from_phase_id")?,
        to_phase_id: parse_uuid(&get_text(row, 2), "phase_transition_rules.to_phase_id")?,
        task_template_id: parse_uuid_opt(
            get_opt_text(row, 3),
            "phase_transition_rules.task_template_id",
        )?,
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

async fn insert_item(
    conn: &libsql::Connection,
    task_template_id: Uuid,
    input: &TemplateItemParams,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO task_template_items (id, task_template_id, description, due_date_offset_days, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            id.to_string(),
            task_template_id.to_string(),
            input.description.trim(),
            input.due_date_offset_days,
            now_ts(),
        ],
    )
    .await?;
    Ok(id)
}

impl LibSqlBackend {
    async fn template_items(
        &self,
        task_template_id: Uuid,
    ) -> Result<Vec<TaskTemplateItemRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM task_template_items WHERE task_template_id = ?1 \
                     ORDER BY due_date_offset_days ASC, created_at ASC"
                ),
                params![task_template_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_item_record(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl WorkflowTemplateStore for LibSqlBackend {
    async fn create_task_template(
        &self,
        name: &str,
        items: &[TemplateItemParams],
    ) -> Result<TaskTemplateWithItems, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();

        conn.execute("BEGIN", ()).await?;
        let result = async {
            conn.execute(
                "INSERT INTO task_templates (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), name.trim(), now_ts()],
            )
            .await?;
            for item in items {
                insert_item(&conn, id, item).await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ()).await?;
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(err);
            }
        }

        self.get_task_template(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created task template".to_string()))
    }

    async fn get_task_template(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskTemplateWithItems>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let template = row_to_template_record(&row)?;
        let items = self.template_items(id).await?;
        Ok(Some(TaskTemplateWithItems { template, items }))
    }

    async fn list_task_templates(&self) -> Result<Vec<TaskTemplateWithItems>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates ORDER BY name ASC"),
                (),
            )
            .await?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next().await? {
            templates.push(row_to_template_record(&row)?);
        }

        let mut out = Vec::with_capacity(templates.len());
        for template in templates {
            let items = self.template_items(template.id).await?;
            out.push(TaskTemplateWithItems { template, items });
        }
        Ok(out)
    }

    async fn update_task_template(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<TaskTemplateWithItems>, DatabaseError> {
        let conn = self.connect().await?;
        let updated = conn
            .execute(
                "UPDATE task_templates SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), name.trim(), now_ts()],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_task_template(id).await
    }

    async fn delete_task_template(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM task_templates WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn create_template_item(
        &self,
        task_template_id: Uuid,
        input: &TemplateItemParams,
    ) -> Result<TaskTemplateItemRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = insert_item(&conn, task_template_id, input).await?;
        self.get_template_item(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created template item".to_string()))
    }

    async fn get_template_item(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskTemplateItemRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM task_template_items WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_item_record(&row)).transpose()
    }

    async fn update_template_item(
        &self,
        id: Uuid,
        input: &UpdateTemplateItemParams,
    ) -> Result<Option<TaskTemplateItemRecord>, DatabaseError> {
        let Some(existing) = self.get_template_item(id).await? else {
            return Ok(None);
        };

        let merged_description = input
            .description
            .as_deref()
            .unwrap_or(existing.description.as_str())
            .trim();
        let merged_offset = input
            .due_date_offset_days
            .unwrap_or(existing.due_date_offset_days);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE task_template_items SET description = ?2, due_date_offset_days = ?3, updated_at = ?4 \
             WHERE id = ?1",
            params![id.to_string(), merged_description, merged_offset, now_ts()],
        )
        .await?;

        self.get_template_item(id).await
    }

    async fn delete_template_item(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM task_template_items WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn create_transition_rule(
        &self,
        input: &CreateTransitionRuleParams,
    ) -> Result<PhaseTransitionRuleRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO phase_transition_rules (id, from_phase_id, to_phase_id, task_template_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id.to_string(),
                input.from_phase_id.to_string(),
                input.to_phase_id.to_string(),
                opt_uuid(input.task_template_id),
                now_ts(),
            ],
        )
        .await?;

        self.get_transition_rule(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created transition rule".to_string()))
    }

    async fn get_transition_rule(
        &self,
        id: Uuid,
    ) -> Result<Option<PhaseTransitionRuleRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM phase_transition_rules WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?
            .next()
            .await?;
        row.map(|row| row_to_rule_record(&row)).transpose()
    }

    async fn list_transition_rules(
        &self,
        from_phase_id: Option<Uuid>,
    ) -> Result<Vec<PhaseTransitionRuleRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = match from_phase_id {
            Some(from) => {
                conn.query(
                    &format!(
                        "SELECT {RULE_COLUMNS} FROM phase_transition_rules WHERE from_phase_id = ?1 \
                         ORDER BY created_at ASC"
                    ),
                    params![from.to_string()],
                )
                .await?
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {RULE_COLUMNS} FROM phase_transition_rules ORDER BY created_at ASC"
                    ),
                    (),
                )
                .await?
            }
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_rule_record(&row)?);
        }
        Ok(out)
    }

    async fn update_transition_rule(
        &self,
        id: Uuid,
        input: &UpdateTransitionRuleParams,
    ) -> Result<Option<PhaseTransitionRuleRecord>, DatabaseError> {
        let Some(existing) = self.get_transition_rule(id).await? else {
            return Ok(None);
        };

        let merged_from = input.from_phase_id.unwrap_or(existing.from_phase_id);
        let merged_to = input.to_phase_id.unwrap_or(existing.to_phase_id);
        let merged_template = input.task_template_id.unwrap_or(existing.task_template_id);

        let conn = self.connect().await?;
        conn.execute(
            "UPDATE phase_transition_rules SET from_phase_id = ?2, to_phase_id = ?3, \
               task_template_id = ?4, updated_at = ?5 \
             WHERE id = ?1",
            params![
                id.to_string(),
                merged_from.to_string(),
                merged_to.to_string(),
                opt_uuid(merged_template),
                now_ts(),
            ],
        )
        .await?;

        self.get_transition_rule(id).await
    }

    async fn delete_transition_rule(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM phase_transition_rules WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl PhaseTransitionStore for LibSqlBackend {
    async fn apply_phase_transition(
        &self,
        input: &ApplyPhaseTransitionParams,
    ) -> Result<AppliedPhaseTransition, DatabaseError> {
        let conn = self.connect().await?;

        conn.execute("BEGIN", ()).await?;
        let result = async {
            // `IS` so a phaseless case matches a NULL expected phase.
            let updated = conn
                .execute(
                    "UPDATE cases SET current_phase_id = ?2, updated_at = ?4 \
                     WHERE id = ?1 AND current_phase_id IS ?3",
                    params![
                        input.case_id.to_string(),
                        input.to_phase_id.to_string(),
                        opt_uuid(input.from_phase_id),
                        now_ts(),
                    ],
                )
                .await?;
            if updated == 0 {
                return Err(DatabaseError::Constraint(format!(
                    "case {} is no longer in the expected phase",
                    input.case_id
                )));
            }

            let event = insert_case_event(&conn, &input.event).await?;
            let mut generated_tasks = Vec::with_capacity(input.tasks.len());
            for task in &input.tasks {
                generated_tasks.push(insert_task(&conn, task).await?);
            }
            for (user_id, message) in &input.notices {
                insert_notice(&conn, *user_id, &input.event.event_type, message).await?;
            }
            Ok((event, generated_tasks))
        }
        .await;

        let (event, generated_tasks) = match result {
            Ok(written) => {
                conn.execute("COMMIT", ()).await?;
                written
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(err);
            }
        };

        let case = self
            .get_case(input.case_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "case".to_string(),
                id: input.case_id.to_string(),
            })?;
        tracing::debug!(
            case_id = %input.case_id,
            to_phase = %input.to_phase_id,
            tasks = generated_tasks.len(),
            "phase transition applied"
        );

        Ok(AppliedPhaseTransition {
            case,
            event,
            generated_tasks,
            notices_created: input.notices.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::libsql::test_support::setup_backend;
    use crate::db::{
        CaseCategoryStore, CaseEventStore, CasePhaseStore, CreateCaseCategoryParams,
        CreateCaseEventParams, CreateCaseParams, CreateCasePhaseParams, CreateTaskParams,
        PHASE_TRANSITION_EVENT, TaskStatus, TaskStore,
    };

    struct Seeded {
        case_id: Uuid,
        intake: Uuid,
        trial: Uuid,
    }

    async fn seed(backend: &LibSqlBackend) -> Seeded {
        let category = backend
            .create_category(&CreateCaseCategoryParams {
                name: "Civil".to_string(),
                parent_category_id: None,
                role_definitions: serde_json::json!({}),
            })
            .await
            .expect("category");
        let mut phases = Vec::new();
        for (name, order) in [("Intake", 1), ("Trial", 2)] {
            phases.push(
                backend
                    .create_phase(&CreateCasePhaseParams {
                        category_id: category.id,
                        name: name.to_string(),
                        order,
                    })
                    .await
                    .expect("phase")
                    .id,
            );
        }
        let mut params = CreateCaseParams::new("Transition", category.id);
        params.current_phase_id = Some(phases[0]);
        let case = backend.create_case(&params).await.expect("case");
        Seeded {
            case_id: case.id,
            intake: phases[0],
            trial: phases[1],
        }
    }

    fn transition(seeded: &Seeded, from: Option<Uuid>) -> ApplyPhaseTransitionParams {
        ApplyPhaseTransitionParams {
            case_id: seeded.case_id,
            from_phase_id: from,
            to_phase_id: seeded.trial,
            event: CreateCaseEventParams {
                case_id: seeded.case_id,
                event_type: PHASE_TRANSITION_EVENT.to_string(),
                date_time: Utc::now(),
                location: None,
                title: Some("Phase transitioned from Intake to Trial".to_string()),
                description: None,
                created_by: None,
            },
            tasks: vec![CreateTaskParams {
                case_id: seeded.case_id,
                title: "Prepare witness list".to_string(),
                description: None,
                status: TaskStatus::Pending,
                due_date: None,
                assigned_to: None,
            }],
            notices: Vec::new(),
        }
    }

    #[tokio::test]
    async fn template_items_are_created_with_template() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;

        let template = backend
            .create_task_template(
                "Trial prep",
                &[
                    TemplateItemParams {
                        description: "File brief".to_string(),
                        due_date_offset_days: 14,
                    },
                    TemplateItemParams {
                        description: "Call client".to_string(),
                        due_date_offset_days: 1,
                    },
                ],
            )
            .await
            .expect("template");
        let descriptions: Vec<&str> = template
            .items
            .iter()
            .map(|i| i.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["Call client", "File brief"]);

        assert!(backend.delete_task_template(template.template.id).await.expect("delete"));
        assert!(
            backend
                .get_template_item(template.items[0].id)
                .await
                .expect("get item")
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_rule_for_phase_pair_is_rejected() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let seeded = seed(backend).await;

        let params = CreateTransitionRuleParams {
            from_phase_id: seeded.intake,
            to_phase_id: seeded.trial,
            task_template_id: None,
        };
        backend.create_transition_rule(&params).await.expect("rule");
        let err = backend
            .create_transition_rule(&params)
            .await
            .expect_err("duplicate");
        assert!(err.is_unique_violation());
        assert_eq!(
            backend
                .list_transition_rules(Some(seeded.intake))
                .await
                .expect("list")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn apply_transition_writes_case_event_and_tasks() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let seeded = seed(backend).await;

        let applied = backend
            .apply_phase_transition(&transition(&seeded, Some(seeded.intake)))
            .await
            .expect("apply");
        assert_eq!(applied.case.current_phase_id, Some(seeded.trial));
        assert_eq!(applied.generated_tasks.len(), 1);
        assert_eq!(applied.event.event_type, PHASE_TRANSITION_EVENT);

        let events = backend
            .list_case_events(seeded.case_id, Some(PHASE_TRANSITION_EVENT))
            .await
            .expect("events");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn stale_transition_rolls_back_everything() {
        let fixture = setup_backend().await;
        let backend = &fixture.backend;
        let seeded = seed(backend).await;

        // The case is in Intake, not phaseless.
        let err = backend
            .apply_phase_transition(&transition(&seeded, None))
            .await
            .expect_err("stale");
        assert!(matches!(err, DatabaseError::Constraint(_)));

        let case = backend
            .get_case(seeded.case_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(case.current_phase_id, Some(seeded.intake));
        assert!(
            backend
                .list_tasks_for_case(seeded.case_id)
                .await
                .expect("tasks")
                .is_empty()
        );
    }
}
