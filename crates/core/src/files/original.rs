use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::{get_identifier, ArchiveFile, BaseFile, FileType, IdentifyContext, EXTENSION_MISMATCH};
use crate::error::CoreError;
use crate::reference_files::{
    Action, ActionData, ActionType, Actions, IgnoreAction, IgnoreIfAction, OnFail, TemplateType, GLOBAL_ACTION_KEY,
};
use crate::utils::{self, EncodingMode};

/// Upper bound on how many `alternatives` redirects are followed.
const MAX_ALTERNATIVE_DEPTH: usize = 8;

/// A file as it was received, with the action assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginalFile {
    #[serde(flatten)]
    pub base: BaseFile,
    pub action: Option<ActionType>,
    pub action_data: ActionData,
    /// The archive file this one was extracted from.
    pub parent: Option<Uuid>,
    pub processed: bool,
    /// Locked files are skipped by automated edits.
    pub lock: bool,
    /// Relative path at the time the file was first registered.
    pub original_path: PathBuf,
}

impl ArchiveFile for OriginalFile {
    const FILE_TYPE: FileType = FileType::Original;

    fn base(&self) -> &BaseFile {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFile {
        &mut self.base
    }
}

impl OriginalFile {
    /// Wrap a base file with no action; the original path is the current one.
    pub fn new(base: BaseFile) -> Self {
        let original_path = base.relative_path.clone();
        Self {
            base,
            action: None,
            action_data: ActionData::default(),
            parent: None,
            processed: false,
            lock: false,
            original_path,
        }
    }

    /// Read a file from disk, identify it and assign its action.
    pub fn from_file(
        path: &Path,
        root: &Path,
        ctx: IdentifyContext<'_, Action>,
        uuid: Option<Uuid>,
        parent: Option<Uuid>,
        encoding: &EncodingMode,
    ) -> Result<Self, CoreError> {
        let base = BaseFile::from_file(path, root, None, None, uuid, encoding)?;
        let mut file = Self::new(base);
        file.parent = parent;
        file.identify(ctx)?;
        Ok(file)
    }

    /// Identify the file and assign an action.
    ///
    /// Nothing changes unless siegfried results or custom signatures are
    /// given. If actions are given but none apply, the action is cleared.
    pub fn identify(&mut self, ctx: IdentifyContext<'_, Action>) -> Result<(), CoreError> {
        if ctx.siegfried.is_none() && ctx.custom_signatures.is_none() {
            return Ok(());
        }

        let mut from_custom_signatures = false;
        let mut file_classes: Vec<String> = Vec::new();

        if let Some(sf) = ctx.siegfried {
            if let Some(m) = self.base.identify(sf, true) {
                file_classes = m.match_class.clone();
            }
        }

        if let Some(signatures) = ctx.custom_signatures {
            if self.base.puid.is_none() {
                self.base.identify_custom(signatures, None, true)?;
                from_custom_signatures = true;
            }
        }

        let Some(actions) = ctx.actions else {
            return Ok(());
        };

        let Some(mut action) = self.get_action(actions, &file_classes, false).cloned() else {
            self.action = None;
            self.action_data = ActionData::default();
            return Ok(());
        };

        if let (Some(reidentify), Some(signatures), false) =
            (action.data.reidentify.clone(), ctx.custom_signatures, from_custom_signatures)
        {
            if self
                .base
                .identify_custom(signatures, reidentify.chunk_size, true)?
                .is_some()
            {
                action = match self.get_action(actions, &file_classes, false) {
                    Some(found) => found.clone(),
                    None => Action::manual("", "No action available for custom PUID", ""),
                };
            } else if reidentify.on_fail == OnFail::Null {
                action.action = None;
            }
        }

        self.action = action.action;
        self.action_data = action.action_data();

        if let Some(rules) = &action.ignore_if {
            ignore_if(self, rules)?;
        }

        if self.action != Some(ActionType::Ignore) {
            if let Some(rules) = actions.get(GLOBAL_ACTION_KEY).and_then(|a| a.ignore_if.as_ref()) {
                ignore_if(self, rules)?;
            }
        }

        if !action.ignore_warnings.is_empty() {
            if let Some(warnings) = self.base.warning.take() {
                let ignored: Vec<String> = action.ignore_warnings.iter().map(|w| w.to_lowercase()).collect();
                let kept: Vec<String> = warnings
                    .into_iter()
                    .filter(|w| !ignored.contains(&w.to_lowercase()))
                    .collect();
                self.base.warning = (!kept.is_empty()).then_some(kept);
            }
        }

        Ok(())
    }

    /// Find the action for the file's identifiers.
    ///
    /// If the action lists an alternative PUID for the file's suffixes and
    /// that PUID has an action of its own, the file takes the alternative
    /// PUID and its action. With `set_match` the action is copied onto the
    /// file (and an extension mismatch resolved by an alternative is
    /// dropped); without a match the action fields are cleared.
    pub fn get_action<'a>(
        &mut self,
        actions: &'a Actions,
        file_classes: &[String],
        set_match: bool,
    ) -> Option<&'a Action> {
        let (action, from_alternative) = self.resolve_action(actions, file_classes, 0);

        if set_match {
            match action {
                Some(action) => {
                    self.base.signature = Some(action.name.clone());
                    self.action = action.action;
                    self.action_data = action.action_data();
                    if from_alternative {
                        if let Some(warnings) = self.base.warning.take() {
                            let kept: Vec<String> = warnings
                                .into_iter()
                                .filter(|w| !w.eq_ignore_ascii_case(EXTENSION_MISMATCH))
                                .collect();
                            self.base.warning = (!kept.is_empty()).then_some(kept);
                        }
                    }
                }
                None => {
                    if self.base.puid.is_none() {
                        self.base.signature = None;
                    }
                    self.action = None;
                    self.action_data = ActionData::default();
                }
            }
        }

        action
    }

    fn resolve_action<'a>(
        &mut self,
        actions: &'a Actions,
        file_classes: &[String],
        depth: usize,
    ) -> (Option<&'a Action>, bool) {
        let action = get_identifier(&self.base, file_classes, actions);

        let Some(current) = action else {
            return (None, false);
        };

        if depth >= MAX_ALTERNATIVE_DEPTH || current.alternatives.is_empty() {
            return (action, false);
        }

        let Some(new_puid) = current.alternatives.get(&self.base.suffixes().to_lowercase()) else {
            return (action, false);
        };

        let previous = self.base.puid.replace(new_puid.clone());
        match self.resolve_action(actions, file_classes, depth + 1) {
            (Some(found), _) => (Some(found), true),
            (None, _) => {
                self.base.puid = previous;
                (action, false)
            }
        }
    }
}

/// Apply `ignore_if` thresholds to a file.
///
/// Image rules read the image header; the size rule is only checked when
/// there are no image rules. A file that falls below a threshold gets the
/// `ignore` action with the `not-preservable` template.
pub fn ignore_if(file: &mut OriginalFile, rules: &IgnoreIfAction) -> Result<(), CoreError> {
    let mut reason: Option<String> = None;

    if rules.has_image_rules() {
        let (width, height) = utils::image_size(&file.base.absolute_path(None))?;
        let (width, height) = (u64::from(width), u64::from(height));

        if let Some(min) = rules.image_width_min.filter(|&min| width < min) {
            reason = Some(format!("Image width is too small ({width}px < {min})"));
        } else if let Some(min) = rules.image_height_min.filter(|&min| height < min) {
            reason = Some(format!("Image height is too small ({height}px < {min})"));
        } else if let Some(min) = rules.image_pixels_min.filter(|&min| width * height < min) {
            reason = Some(format!("Image resolution is too small ({}px < {min})", width * height));
        }
    } else if rules.size.is_some_and(|min| file.base.size < min) {
        reason = Some("File size is too small".to_string());
    }

    if let Some(reason) = reason {
        tracing::debug!(path = %file.base.relative_path.display(), %reason, "Ignoring file");
        file.action = Some(ActionType::Ignore);
        file.action_data.ignore = Some(IgnoreAction::new(TemplateType::NotPreservable, Some(reason)));
    }

    Ok(())
}
