//! Simplified sequencing for SCORM 1.2 and LRM packages.
//!
//! There are no sequencing rules and no rollup. Flow walks the tree in
//! preorder over items that launch a resource, choice accepts any such item,
//! and delivery is gated only by the item's prerequisite script.

use super::prerequisites;
use super::NavigationCommand;
use crate::activity::{ActivityId, LessonStatus};
use crate::error::{InternalError, NavigatorError, Result, SequencingCode};
use crate::navigator::data::NavigatorData;
use crate::navigator::log::SequencingEventType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scorm12SeqNav;

impl Scorm12SeqNav {
    /// Returns true when the sequencing session ended.
    pub fn overall_sequencing_process(
        &self,
        data: &mut NavigatorData,
        command: NavigationCommand,
        destination: Option<ActivityId>,
    ) -> Result<bool> {
        use NavigationCommand as C;

        match command {
            C::Abandon | C::UnqualifiedExit => {
                let current = data.current().ok_or(SequencingCode::SessionNotBegun)?;
                exit_activity(data, current);
                data.set_current(None);
                Ok(false)
            }
            C::AbandonAll => {
                end_session(data);
                Ok(true)
            }
            C::ExitAll => {
                data.current().ok_or(SequencingCode::SessionNotBegun)?;
                end_session(data);
                Ok(true)
            }
            C::SuspendAll => {
                let current = data.current().ok_or(SequencingCode::SessionNotBegun)?;
                exit_activity(data, current);
                data.model_mut(current).is_suspended = true;
                data.set_suspended(Some(current));
                data.set_current(None);
                Ok(true)
            }
            C::Choose => {
                let target = destination.ok_or(SequencingCode::TargetDoesNotExist)?;
                if !is_launchable(data, target) {
                    return Err(SequencingCode::ChoiceViolation.into());
                }
                if let Some(current) = data.current() {
                    exit_activity(data, current);
                }
                deliver(data, target)?;
                Ok(false)
            }
            C::Continue | C::Previous => {
                let current = data.current().ok_or(SequencingCode::SessionNotBegun)?;
                let target = flow(data, current, command)?;
                exit_activity(data, current);
                deliver(data, target)?;
                Ok(false)
            }
            C::Start => {
                if data.current().is_some() {
                    return Err(SequencingCode::SessionAlreadyBegun.into());
                }
                let first = data
                    .tree()
                    .preorder()
                    .into_iter()
                    .find(|id| is_launchable(data, *id))
                    .ok_or(SequencingCode::DeliverNothing)?;
                deliver(data, first)?;
                Ok(false)
            }
            C::ResumeAll => {
                if data.current().is_some() {
                    return Err(SequencingCode::SessionAlreadyBegun.into());
                }
                let suspended = data.suspended().ok_or(SequencingCode::NoSuspendedActivity)?;
                deliver(data, suspended)?;
                Ok(false)
            }
            C::ChoiceStart => Err(InternalError::UnsupportedCommand {
                command,
                variant: "scorm12",
            }
            .into()),
        }
    }
}

fn is_launchable(data: &NavigatorData, id: ActivityId) -> bool {
    data.tree()[id].has_resource()
}

/// Next (or previous) launchable item in preorder from `current`.
fn flow(data: &mut NavigatorData, current: ActivityId, command: NavigationCommand) -> Result<ActivityId> {
    let forward = command == NavigationCommand::Continue;
    let step = |data: &NavigatorData, id: ActivityId| {
        if forward {
            data.tree().next_in_preorder(id)
        } else {
            data.tree().previous_in_preorder(id)
        }
    };
    let mut candidate = step(data, current);
    while let Some(id) = candidate {
        if is_launchable(data, id) {
            return Ok(id);
        }
        data.record(
            SequencingEventType::IntermediateNavigation,
            Some(command),
            Some(id),
            "flowing past item without a resource",
        );
        candidate = step(data, id);
    }
    Err(if forward {
        SequencingCode::FlowPastLastActivity
    } else {
        SequencingCode::FlowBeforeRoot
    }
    .into())
}

/// Close out the current and suspended items and clear both pointers.
fn end_session(data: &mut NavigatorData) {
    for id in [data.current(), data.suspended()].into_iter().flatten() {
        exit_activity(data, id);
    }
    data.set_current(None);
    data.set_suspended(None);
}

/// 1.2 exit bookkeeping: settle the lesson status and bank the session time.
fn exit_activity(data: &mut NavigatorData, id: ActivityId) {
    let model = data.model_mut(id);
    if model.lesson_status == LessonStatus::NotAttempted {
        model.lesson_status = LessonStatus::Completed;
    }
    if model.credit {
        if let (Some(mastery), Some(raw)) = (model.mastery_score(), model.score.raw) {
            model.lesson_status = if raw >= mastery {
                LessonStatus::Passed
            } else {
                LessonStatus::Failed
            };
        }
    }
    model.is_active = false;
    model.accumulate_session_time();
}

fn check_prerequisites(data: &NavigatorData, id: ActivityId) -> Result<()> {
    let Some(script) = data.tree()[id].prerequisites() else {
        return Ok(());
    };
    let lookup = |key: &str| {
        data.activity_key_to_activity(key)
            .map(|other| data.model(other).lesson_status)
    };
    match prerequisites::evaluate(script, lookup) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SequencingCode::DeliverUnavailable.into()),
        Err(err) => Err(NavigatorError::Prerequisites {
            script: script.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn deliver(data: &mut NavigatorData, id: ActivityId) -> Result<()> {
    check_prerequisites(data, id)?;

    data.set_current(Some(id));
    data.set_suspended(None);

    let objectives = data.tree()[id].definition().objectives.clone();
    let resumed = data.model(id).is_suspended;
    if resumed {
        let model = data.model_mut(id);
        model.is_suspended = false;
        model.initialize_for_delivery_after_suspend();
    } else {
        let model = data.model_mut(id);
        model.attempt_count += 1;
        model.initialize_for_delivery(&objectives);
        data.set_evaluation_points(id, None);
    }
    data.model_mut(id).is_active = true;
    data.record(
        SequencingEventType::IntermediateNavigation,
        None,
        Some(id),
        if resumed { "resumed" } else { "delivered" },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::ActivityDefinition;
    use crate::activity::{PackageDefinition, PackageFormat};
    use crate::config::NavigatorConfig;

    fn data(children: Vec<ActivityDefinition>) -> NavigatorData {
        let package = PackageDefinition {
            format: PackageFormat::V1p2,
            root: ActivityDefinition::cluster("course", "Course", children),
        };
        NavigatorData::new(&package, &NavigatorConfig::default()).unwrap()
    }

    fn three_lessons() -> NavigatorData {
        data(vec![
            ActivityDefinition::leaf("a", "A"),
            ActivityDefinition::cluster(
                "module",
                "Module",
                vec![ActivityDefinition::leaf("b", "B")],
            ),
            ActivityDefinition::leaf("c", "C"),
        ])
    }

    fn id(data: &NavigatorData, key: &str) -> ActivityId {
        data.activity_key_to_activity(key).unwrap()
    }

    fn run(data: &mut NavigatorData, command: NavigationCommand) -> Result<bool> {
        Scorm12SeqNav.overall_sequencing_process(data, command, None)
    }

    fn code(err: NavigatorError) -> Option<&'static str> {
        err.sequencing_code().map(|c| c.code())
    }

    #[test]
    fn test_start_skips_items_without_resources() {
        let mut data = three_lessons();
        run(&mut data, NavigationCommand::Start).unwrap();
        let a = id(&data, "a");
        assert_eq!(data.current(), Some(a));
        assert!(data.model(a).is_active);
        assert_eq!(data.model(a).attempt_count, 1);
    }

    #[test]
    fn test_continue_flows_over_clusters() {
        let mut data = three_lessons();
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        assert_eq!(data.current(), Some(id(&data, "b")));
        assert_eq!(data.model(id(&data, "a")).lesson_status, LessonStatus::Completed);

        run(&mut data, NavigationCommand::Continue).unwrap();
        let err = run(&mut data, NavigationCommand::Continue).unwrap_err();
        assert_eq!(code(err), Some("SB.2.1-1"));
    }

    #[test]
    fn test_previous_before_first_item_fails() {
        let mut data = three_lessons();
        run(&mut data, NavigationCommand::Start).unwrap();
        let err = run(&mut data, NavigationCommand::Previous).unwrap_err();
        assert_eq!(code(err), Some("SB.2.1-3"));
    }

    #[test]
    fn test_commands_without_session() {
        let mut data = three_lessons();
        for command in [
            NavigationCommand::Continue,
            NavigationCommand::Previous,
            NavigationCommand::ExitAll,
            NavigationCommand::SuspendAll,
            NavigationCommand::Abandon,
        ] {
            let err = run(&mut data, command).unwrap_err();
            assert_eq!(code(err), Some("NB.2.1-2"), "{command}");
        }
        assert!(run(&mut data, NavigationCommand::AbandonAll).unwrap());
    }

    #[test]
    fn test_choose_requires_resource() {
        let mut data = three_lessons();
        let module = id(&data, "module");
        let err = Scorm12SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(module))
            .unwrap_err();
        assert_eq!(code(err), Some("NB.2.1-10"));

        let err = run(&mut data, NavigationCommand::Choose).unwrap_err();
        assert_eq!(code(err), Some("NB.2.1-11"));
    }

    #[test]
    fn test_mastery_score_decides_pass_or_fail() {
        let mut data = data(vec![
            ActivityDefinition {
                mastery_score: Some(70.0),
                ..ActivityDefinition::leaf("quiz", "Quiz")
            },
            ActivityDefinition::leaf("next", "Next"),
        ]);
        run(&mut data, NavigationCommand::Start).unwrap();
        let quiz = id(&data, "quiz");
        data.model_mut(quiz).score.raw = Some(65.0);
        run(&mut data, NavigationCommand::Continue).unwrap();
        assert_eq!(data.model(quiz).lesson_status, LessonStatus::Failed);
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut data = three_lessons();
        run(&mut data, NavigationCommand::Start).unwrap();
        let a = id(&data, "a");
        assert!(run(&mut data, NavigationCommand::SuspendAll).unwrap());
        assert_eq!(data.current(), None);
        assert_eq!(data.suspended(), Some(a));

        run(&mut data, NavigationCommand::ResumeAll).unwrap();
        assert_eq!(data.current(), Some(a));
        assert_eq!(data.suspended(), None);
        assert!(!data.model(a).is_suspended);
        assert_eq!(data.model(a).attempt_count, 1);
    }

    #[test]
    fn test_resume_without_suspend_fails() {
        let mut data = three_lessons();
        let err = run(&mut data, NavigationCommand::ResumeAll).unwrap_err();
        assert_eq!(code(err), Some("NB.2.1-3"));
    }

    #[test]
    fn test_prerequisites_gate_delivery() {
        let mut data = data(vec![
            ActivityDefinition::leaf("intro", "Intro"),
            ActivityDefinition::leaf("quiz", "Quiz").with_prerequisites("intro"),
        ]);
        let quiz = id(&data, "quiz");
        let err = Scorm12SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(quiz))
            .unwrap_err();
        assert_eq!(code(err), Some("DB.1.1-3"));

        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        assert_eq!(data.current(), Some(quiz));
    }

    #[test]
    fn test_broken_prerequisite_script_is_not_a_sequencing_failure() {
        let mut data = data(vec![
            ActivityDefinition::leaf("quiz", "Quiz").with_prerequisites("intro &"),
        ]);
        let err = run(&mut data, NavigationCommand::Start).unwrap_err();
        assert!(matches!(err, NavigatorError::Prerequisites { .. }));
    }
}
