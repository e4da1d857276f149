use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Game,
    Survey,
    Signup,
    Ad,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward: f64,
    #[serde(default)]
    pub currency_val: Option<f64>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub is_multi_task: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_completions: Option<i64>,
}

impl Task {
    pub fn duplicate(&self, new_id: String) -> Task {
        Task {
            id: new_id,
            title: format!("{} (Copy)", self.title),
            is_active: false,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompleteTask {
    pub reward: f64,
}
