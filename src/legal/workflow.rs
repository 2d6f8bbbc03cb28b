//! Case workflow rules: the category hierarchy and phase transitions.
//!
//! Categories form a forest through `parent_category_id`. `CategoryTree`
//! holds one snapshot of it in an arena so parent changes can be checked
//! for cycles before they are written.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    AppliedPhaseTransition, ApplyPhaseTransitionParams, CaseCategoryRecord, CasePhaseRecord,
    CaseRecord, CreateCaseEventParams, CreateTaskParams, Database, PHASE_TRANSITION_EVENT,
    PhaseTransitionRuleRecord, TaskStatus, TaskTemplateWithItems,
};
use crate::error::{TransitionError, WorkflowError};

#[derive(Debug, Clone)]
struct CategoryNode {
    record: CaseCategoryRecord,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena of categories indexed by id.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    index: HashMap<Uuid, usize>,
}

/// Nested view returned by the tree endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: CaseCategoryRecord,
    pub children: Vec<CategoryTreeNode>,
}

impl CategoryTree {
    /// Build the arena. A parent id that is not in `records` leaves the
    /// category as a root.
    pub fn from_records(records: Vec<CaseCategoryRecord>) -> Self {
        let index: HashMap<Uuid, usize> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id, idx))
            .collect();
        let mut nodes: Vec<CategoryNode> = records
            .into_iter()
            .map(|record| CategoryNode {
                record,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        for idx in 0..nodes.len() {
            let parent = nodes[idx]
                .record
                .parent_category_id
                .and_then(|parent_id| index.get(&parent_id).copied())
                .filter(|parent_idx| *parent_idx != idx);
            nodes[idx].parent = parent;
            if let Some(parent_idx) = parent {
                nodes[parent_idx].children.push(idx);
            }
        }

        Self { nodes, index }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&CaseCategoryRecord> {
        self.index.get(&id).map(|idx| &self.nodes[*idx].record)
    }

    /// Parent chain from nearest to furthest. Bounded by the arena size so
    /// corrupt data cannot loop forever.
    pub fn ancestors(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let Some(mut current) = self.index.get(&id).copied() else {
            return out;
        };
        while let Some(parent) = self.nodes[current].parent {
            if out.len() >= self.nodes.len() {
                break;
            }
            out.push(self.nodes[parent].record.id);
            current = parent;
        }
        out
    }

    /// True when making `new_parent` the parent of `child` closes a loop.
    pub fn would_create_cycle(&self, child: Uuid, new_parent: Uuid) -> bool {
        child == new_parent || self.ancestors(new_parent).contains(&child)
    }

    /// Every category below `id`, breadth first.
    pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let Some(start) = self.index.get(&id).copied() else {
            return out;
        };
        let mut seen = HashSet::from([start]);
        let mut queue: VecDeque<usize> = self.nodes[start].children.iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) {
                continue;
            }
            out.push(self.nodes[idx].record.id);
            queue.extend(self.nodes[idx].children.iter().copied());
        }
        out
    }

    /// Zero for roots.
    pub fn depth(&self, id: Uuid) -> Option<usize> {
        self.contains(id).then(|| self.ancestors(id).len())
    }

    pub fn roots(&self) -> Vec<&CaseCategoryRecord> {
        self.nodes
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| &node.record)
            .collect()
    }

    pub fn to_nested(&self) -> Vec<CategoryTreeNode> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(idx, _)| self.nest(idx, &mut seen))
            .collect()
    }

    fn nest(&self, idx: usize, seen: &mut HashSet<usize>) -> CategoryTreeNode {
        seen.insert(idx);
        let node = &self.nodes[idx];
        let mut children: Vec<CategoryTreeNode> = Vec::with_capacity(node.children.len());
        for child in &node.children {
            if !seen.contains(child) {
                children.push(self.nest(*child, seen));
            }
        }
        children.sort_by(|a, b| a.category.name.cmp(&b.category.name));
        CategoryTreeNode {
            category: node.record.clone(),
            children,
        }
    }
}

/// Check a parent assignment before it is written.
///
/// `child` is `None` when the category is being created.
pub fn validate_parent_assignment(
    tree: &CategoryTree,
    child: Option<Uuid>,
    new_parent: Option<Uuid>,
) -> Result<(), WorkflowError> {
    let Some(parent) = new_parent else {
        return Ok(());
    };
    if child == Some(parent) {
        return Err(WorkflowError::Cycle);
    }
    if !tree.contains(parent) {
        return Err(WorkflowError::UnknownParent(parent.to_string()));
    }
    if let Some(child) = child
        && tree.would_create_cycle(child, parent)
    {
        return Err(WorkflowError::Cycle);
    }
    Ok(())
}

/// Largest accepted template item offset, in either direction.
pub const MAX_DUE_DATE_OFFSET_DAYS: i64 = 36_500;

/// Reject template item offsets outside `MAX_DUE_DATE_OFFSET_DAYS`.
pub fn check_due_date_offset(offset_days: i64) -> Result<i64, WorkflowError> {
    if offset_days.abs() > MAX_DUE_DATE_OFFSET_DAYS {
        return Err(WorkflowError::DueDateOutOfRange(offset_days));
    }
    Ok(offset_days)
}

fn due_date_after(now: DateTime<Utc>, offset_days: i64) -> Result<DateTime<Utc>, WorkflowError> {
    Duration::try_days(offset_days)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or(WorkflowError::DueDateOutOfRange(offset_days))
}

/// A validated phase change, ready to be written.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub case_id: Uuid,
    pub from_phase: Option<CasePhaseRecord>,
    pub to_phase: CasePhaseRecord,
    pub rule: Option<PhaseTransitionRuleRecord>,
    pub tasks: Vec<CreateTaskParams>,
}

impl TransitionPlan {
    /// Add one pending task per template item, due `offset` days from `now`.
    pub fn with_template(
        mut self,
        template: &TaskTemplateWithItems,
        now: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        self.tasks = template
            .items
            .iter()
            .map(|item| {
                Ok(CreateTaskParams {
                    case_id: self.case_id,
                    title: item.description.clone(),
                    description: Some(format!(
                        "Generated from template \"{}\"",
                        template.template.name
                    )),
                    status: TaskStatus::Pending,
                    due_date: Some(due_date_after(now, item.due_date_offset_days)?),
                    assigned_to: None,
                })
            })
            .collect::<Result<_, WorkflowError>>()?;
        Ok(self)
    }

    pub fn event_title(&self) -> String {
        match &self.from_phase {
            Some(from) => format!(
                "Phase transitioned from {} to {}",
                from.name, self.to_phase.name
            ),
            None => format!("Phase set to {}", self.to_phase.name),
        }
    }
}

/// Decide whether `case` may move to `target`.
///
/// `phases` are the phases of the case's category; `rules` are candidate
/// transition rules (any superset of those leaving the current phase).
pub fn plan_phase_transition(
    case: &CaseRecord,
    target: &CasePhaseRecord,
    phases: &[CasePhaseRecord],
    rules: &[PhaseTransitionRuleRecord],
) -> Result<TransitionPlan, WorkflowError> {
    if target.category_id != case.category_id {
        return Err(WorkflowError::PhaseOutsideCategory {
            phase: target.id.to_string(),
            category: case.category_id.to_string(),
        });
    }

    let Some(current_id) = case.current_phase_id else {
        let first = phases
            .iter()
            .filter(|phase| phase.category_id == case.category_id)
            .min_by_key(|phase| phase.order);
        if first.map(|phase| phase.id) != Some(target.id) {
            return Err(WorkflowError::NotInitialPhase);
        }
        return Ok(TransitionPlan {
            case_id: case.id,
            from_phase: None,
            to_phase: target.clone(),
            rule: None,
            tasks: Vec::new(),
        });
    };

    if current_id == target.id {
        return Err(WorkflowError::SamePhase(target.name.clone()));
    }
    let from_phase = phases.iter().find(|phase| phase.id == current_id).cloned();
    let from_label = from_phase
        .as_ref()
        .map(|phase| phase.name.clone())
        .unwrap_or_else(|| current_id.to_string());

    let rule = rules
        .iter()
        .find(|rule| rule.from_phase_id == current_id && rule.to_phase_id == target.id)
        .cloned()
        .ok_or_else(|| WorkflowError::NoRule {
            from: from_label,
            to: target.name.clone(),
        })?;

    Ok(TransitionPlan {
        case_id: case.id,
        from_phase,
        to_phase: target.clone(),
        rule: Some(rule),
        tasks: Vec::new(),
    })
}

/// Move a case to `target_phase_id`: validate, generate template tasks,
/// record the event and notify assigned users in one write.
pub async fn transition_case_phase(
    db: &dyn Database,
    case_id: Uuid,
    target_phase_id: Uuid,
    reason: Option<String>,
    actor: Option<Uuid>,
) -> Result<AppliedPhaseTransition, TransitionError> {
    let case = db
        .get_case(case_id)
        .await?
        .ok_or(TransitionError::CaseNotFound)?;
    let target = db
        .get_phase(target_phase_id)
        .await?
        .ok_or(TransitionError::PhaseNotFound)?;
    let phases = db.list_phases_for_category(case.category_id).await?;
    let rules = match case.current_phase_id {
        Some(current) => db.list_transition_rules(Some(current)).await?,
        None => Vec::new(),
    };

    let now = Utc::now();
    let mut plan = plan_phase_transition(&case, &target, &phases, &rules)?;
    if let Some(template_id) = plan.rule.as_ref().and_then(|rule| rule.task_template_id)
        && let Some(template) = db.get_task_template(template_id).await?
    {
        plan = plan.with_template(&template, now)?;
    }

    let title = plan.event_title();
    let notices = db
        .list_assignments(case_id)
        .await?
        .into_iter()
        .map(|assignment| {
            (
                assignment.user_id,
                format!("{}: {}", case.name, title),
            )
        })
        .collect();

    let applied = db
        .apply_phase_transition(&ApplyPhaseTransitionParams {
            case_id,
            from_phase_id: case.current_phase_id,
            to_phase_id: target.id,
            event: CreateCaseEventParams {
                case_id,
                event_type: PHASE_TRANSITION_EVENT.to_string(),
                date_time: now,
                location: None,
                title: Some(title),
                description: reason,
                created_by: actor,
            },
            tasks: plan.tasks,
            notices,
        })
        .await?;

    tracing::info!(
        case_id = %case_id,
        to_phase = %target.name,
        generated_tasks = applied.generated_tasks.len(),
        "case phase transitioned"
    );
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn category(name: &str, parent: Option<Uuid>) -> CaseCategoryRecord {
        let now = Utc::now();
        CaseCategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parent_category_id: parent,
            role_definitions: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn phase(category_id: Uuid, name: &str, order: i64) -> CasePhaseRecord {
        let now = Utc::now();
        CasePhaseRecord {
            id: Uuid::new_v4(),
            category_id,
            name: name.to_string(),
            order,
            created_at: now,
            updated_at: now,
        }
    }

    fn rule(from: &CasePhaseRecord, to: &CasePhaseRecord) -> PhaseTransitionRuleRecord {
        let now = Utc::now();
        PhaseTransitionRuleRecord {
            id: Uuid::new_v4(),
            from_phase_id: from.id,
            to_phase_id: to.id,
            task_template_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn case_in(category_id: Uuid, phase: Option<Uuid>) -> CaseRecord {
        let now = Utc::now();
        CaseRecord {
            id: Uuid::new_v4(),
            name: "Case".to_string(),
            case_number: None,
            status: None,
            trial_level: None,
            hourly_rate: None,
            first_consultation_date: None,
            engagement_date: None,
            case_closed_date: None,
            judgment_date: None,
            has_engagement_letter: false,
            remarks: None,
            custom_properties: serde_json::json!({}),
            category_id,
            current_phase_id: phase,
            court_division_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// civil -> debt -> small_claims, plus a separate criminal root.
    fn sample_tree() -> (CategoryTree, [Uuid; 4]) {
        let civil = category("Civil", None);
        let debt = category("Debt", Some(civil.id));
        let small = category("Small claims", Some(debt.id));
        let criminal = category("Criminal", None);
        let ids = [civil.id, debt.id, small.id, criminal.id];
        (
            CategoryTree::from_records(vec![small, criminal, civil, debt]),
            ids,
        )
    }

    #[test]
    fn ancestors_depth_and_descendants() {
        let (tree, [civil, debt, small, criminal]) = sample_tree();
        assert_eq!(tree.ancestors(small), vec![debt, civil]);
        assert_eq!(tree.depth(small), Some(2));
        assert_eq!(tree.depth(criminal), Some(0));
        assert_eq!(tree.descendants(civil), vec![debt, small]);
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn reparenting_under_a_descendant_is_a_cycle() {
        let (tree, [civil, debt, small, criminal]) = sample_tree();
        assert!(tree.would_create_cycle(civil, small));
        assert!(tree.would_create_cycle(debt, debt));
        assert!(!tree.would_create_cycle(small, criminal));

        assert_eq!(
            validate_parent_assignment(&tree, Some(civil), Some(small)),
            Err(WorkflowError::Cycle)
        );
        assert_eq!(validate_parent_assignment(&tree, Some(civil), Some(criminal)), Ok(()));
        assert_eq!(validate_parent_assignment(&tree, None, None), Ok(()));
        assert!(matches!(
            validate_parent_assignment(&tree, None, Some(Uuid::new_v4())),
            Err(WorkflowError::UnknownParent(_))
        ));
    }

    #[test]
    fn nested_view_sorts_children_by_name() {
        let civil = category("Civil", None);
        let b = category("B", Some(civil.id));
        let a = category("A", Some(civil.id));
        let tree = CategoryTree::from_records(vec![civil.clone(), b, a]);

        let nested = tree.to_nested();
        assert_eq!(nested.len(), 1);
        let names: Vec<&str> = nested[0]
            .children
            .iter()
            .map(|child| child.category.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn corrupt_cycle_does_not_hang() {
        let mut a = category("A", None);
        let b = category("B", Some(a.id));
        a.parent_category_id = Some(b.id);
        let (a_id, b_id) = (a.id, b.id);
        let tree = CategoryTree::from_records(vec![a, b]);
        assert!(tree.ancestors(a_id).len() <= 2);
        assert!(tree.would_create_cycle(a_id, b_id));
        assert!(tree.to_nested().is_empty());
    }

    #[test]
    fn transition_requires_rule_and_distinct_phase() {
        let category_id = Uuid::new_v4();
        let intake = phase(category_id, "Intake", 1);
        let trial = phase(category_id, "Trial", 2);
        let phases = vec![intake.clone(), trial.clone()];
        let case = case_in(category_id, Some(intake.id));

        assert_eq!(
            plan_phase_transition(&case, &intake, &phases, &[]).map(|p| p.to_phase.id),
            Err(WorkflowError::SamePhase("Intake".to_string()))
        );
        assert!(matches!(
            plan_phase_transition(&case, &trial, &phases, &[]),
            Err(WorkflowError::NoRule { .. })
        ));

        let plan = plan_phase_transition(&case, &trial, &phases, &[rule(&intake, &trial)])
            .expect("planned");
        assert_eq!(plan.event_title(), "Phase transitioned from Intake to Trial");
    }

    #[test]
    fn phaseless_case_may_only_enter_first_phase() {
        let category_id = Uuid::new_v4();
        let intake = phase(category_id, "Intake", 1);
        let trial = phase(category_id, "Trial", 2);
        let phases = vec![trial.clone(), intake.clone()];
        let case = case_in(category_id, None);

        assert_eq!(
            plan_phase_transition(&case, &trial, &phases, &[]).map(|p| p.to_phase.id),
            Err(WorkflowError::NotInitialPhase)
        );
        let plan = plan_phase_transition(&case, &intake, &phases, &[]).expect("first phase");
        assert!(plan.rule.is_none());
        assert_eq!(plan.event_title(), "Phase set to Intake");
    }

    #[test]
    fn phase_from_other_category_is_rejected() {
        let case = case_in(Uuid::new_v4(), None);
        let foreign = phase(Uuid::new_v4(), "Elsewhere", 1);
        assert!(matches!(
            plan_phase_transition(&case, &foreign, &[], &[]),
            Err(WorkflowError::PhaseOutsideCategory { .. })
        ));
    }

    fn template_with_offset(offset_days: i64) -> TaskTemplateWithItems {
        use crate::db::{TaskTemplateItemRecord, TaskTemplateRecord};

        let now = Utc::now();
        let template_id = Uuid::new_v4();
        TaskTemplateWithItems {
            template: TaskTemplateRecord {
                id: template_id,
                name: "Trial prep".to_string(),
                created_at: now,
                updated_at: now,
            },
            items: vec![TaskTemplateItemRecord {
                id: Uuid::new_v4(),
                task_template_id: template_id,
                description: "File witness list".to_string(),
                due_date_offset_days: offset_days,
                created_at: now,
                updated_at: now,
            }],
        }
    }

    #[test]
    fn template_items_become_dated_tasks() {
        let now = Utc::now();
        let template = template_with_offset(7);
        let category_id = Uuid::new_v4();
        let intake = phase(category_id, "Intake", 1);
        let case = case_in(category_id, None);

        let plan = plan_phase_transition(&case, &intake, &[intake.clone()], &[])
            .expect("plan")
            .with_template(&template, now)
            .expect("tasks");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].title, "File witness list");
        assert_eq!(plan.tasks[0].due_date, Some(now + Duration::days(7)));
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn huge_template_offsets_fail_instead_of_overflowing() {
        let now = Utc::now();
        let category_id = Uuid::new_v4();
        let intake = phase(category_id, "Intake", 1);
        let case = case_in(category_id, None);

        let result = plan_phase_transition(&case, &intake, &[intake.clone()], &[])
            .expect("plan")
            .with_template(&template_with_offset(100_000_000_000), now);
        assert!(matches!(
            result,
            Err(WorkflowError::DueDateOutOfRange(100_000_000_000))
        ));
    }

    #[test]
    fn offsets_are_bounded_to_a_century() {
        assert_eq!(check_due_date_offset(-30), Ok(-30));
        assert_eq!(
            check_due_date_offset(MAX_DUE_DATE_OFFSET_DAYS),
            Ok(MAX_DUE_DATE_OFFSET_DAYS)
        );
        assert_eq!(
            check_due_date_offset(MAX_DUE_DATE_OFFSET_DAYS + 1),
            Err(WorkflowError::DueDateOutOfRange(MAX_DUE_DATE_OFFSET_DAYS + 1))
        );
    }
}
