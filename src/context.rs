//! Shared state handed to every manager

use crate::settings::Settings;
use crate::tools::Tools;
use crate::typetree_manager::TypeTreeManager;
use std::sync::Arc;

#[derive(Debug)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub type_trees: Arc<TypeTreeManager>,
    pub tools: Tools,
}

impl Context {
    pub fn new(settings: Arc<Settings>) -> Self {
        let type_trees = TypeTreeManager::from_folders(settings.managed_path.as_deref(), &settings.game_folder);
        Self::with_type_trees(settings, type_trees)
    }

    /// Context with a custom script layout provider
    pub fn with_type_trees(settings: Arc<Settings>, type_trees: TypeTreeManager) -> Self {
        Self {
            tools: Tools::new(settings.tools_dir.clone()),
            type_trees: Arc::new(type_trees),
            settings,
        }
    }
}
