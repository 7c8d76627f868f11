//! Conversational state machine for the profile wizard and the
//! single-input sub-flows (portion size, food name, manual norms).
//!
//! Transitions are pure: they take the current state and draft plus one
//! input and either return the next state or a validation error, in which
//! case the caller leaves the state untouched and re-prompts.

use serde::{Deserialize, Serialize};

use crate::{
    models::nutrition::{ActivityLevel, Gender, Goal, Profile},
    validation::{
        rules::{parse_age, parse_height, parse_weight},
        InputError,
    },
};

/// The single pending conversational expectation of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    #[default]
    Idle,
    AwaitingGender,
    AwaitingAge,
    AwaitingWeight,
    AwaitingHeight,
    AwaitingActivity,
    AwaitingGoal,
    AwaitingFoodName,
    AwaitingPortionSize,
    AwaitingManualNorms,
}

impl DialogState {
    pub fn is_wizard(&self) -> bool {
        matches!(
            self,
            DialogState::AwaitingGender
                | DialogState::AwaitingAge
                | DialogState::AwaitingWeight
                | DialogState::AwaitingHeight
                | DialogState::AwaitingActivity
                | DialogState::AwaitingGoal
        )
    }

    /// States whose prompt is an edited message identified by `pending_message_id`.
    pub fn uses_pending_message(&self) -> bool {
        self.is_wizard()
            || matches!(
                self,
                DialogState::AwaitingFoodName | DialogState::AwaitingPortionSize
            )
    }
}

/// Wizard answers collected so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub gender: Option<Gender>,
    pub age: Option<i32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub activity: Option<ActivityLevel>,
    pub goal: Option<Goal>,
}

impl ProfileDraft {
    pub fn complete(&self) -> Option<Profile> {
        Some(Profile {
            gender: self.gender?,
            age: self.age?,
            weight: self.weight?,
            height: self.height?,
            activity: self.activity?,
            goal: self.goal?,
        })
    }
}

/// One wizard answer, either typed or chosen from a keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WizardInput<'a> {
    Text(&'a str),
    Gender(Gender),
    Activity(ActivityLevel),
    Goal(Goal),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Invalid(#[from] InputError),
    /// The input does not answer the question the state is waiting for,
    /// e.g. a stale keyboard button.
    #[error("input does not match the current step")]
    OutOfStep,
}

/// Outcome of a successful wizard step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WizardStep {
    Next(DialogState),
    Completed(Profile),
}

/// Begins the wizard from any state, discarding previous answers.
pub fn start_wizard(draft: &mut ProfileDraft) -> DialogState {
    *draft = ProfileDraft::default();
    DialogState::AwaitingGender
}

/// Applies one answer. On error neither `state` nor `draft` changes.
pub fn advance(
    state: DialogState,
    draft: &mut ProfileDraft,
    input: WizardInput<'_>,
) -> Result<WizardStep, WizardError> {
    let next = match (state, input) {
        (DialogState::AwaitingGender, WizardInput::Gender(gender)) => {
            draft.gender = Some(gender);
            DialogState::AwaitingAge
        }
        (DialogState::AwaitingAge, WizardInput::Text(text)) => {
            draft.age = Some(parse_age(text)?);
            DialogState::AwaitingWeight
        }
        (DialogState::AwaitingWeight, WizardInput::Text(text)) => {
            draft.weight = Some(parse_weight(text)?);
            DialogState::AwaitingHeight
        }
        (DialogState::AwaitingHeight, WizardInput::Text(text)) => {
            draft.height = Some(parse_height(text)?);
            DialogState::AwaitingActivity
        }
        (DialogState::AwaitingActivity, WizardInput::Activity(activity)) => {
            draft.activity = Some(activity);
            DialogState::AwaitingGoal
        }
        (DialogState::AwaitingGoal, WizardInput::Goal(goal)) => {
            let mut candidate = draft.clone();
            candidate.goal = Some(goal);
            let profile = candidate.complete().ok_or(WizardError::OutOfStep)?;
            *draft = candidate;
            return Ok(WizardStep::Completed(profile));
        }
        _ => return Err(WizardError::OutOfStep),
    };
    Ok(WizardStep::Next(next))
}
