use serde::Serialize;

#[derive(Serialize)]
pub struct ViewersResponse {
    pub count: usize,
    pub viewers: Vec<ViewerInfo>,
}

#[derive(Serialize)]
pub struct ViewerInfo {
    pub id: String,
    pub addr: String,
}

#[derive(Serialize)]
pub struct PileResponse {
    pub slot: usize,
    pub name: String,
    pub owner: String,
    pub size: usize,
    pub face_up: usize,
}

#[derive(Serialize)]
pub struct TableSummaryResponse {
    pub piles: Vec<PileResponse>,
    pub pile_names: Vec<String>,
    pub default_pile_counter: u32,
    pub host_still_present: bool,
}
