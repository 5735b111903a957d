use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde::Serialize;

/// Represents a university course offering.
///
/// The geofence columns are optional; attendance windows cannot open for a
/// course until all three are configured.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Course code (e.g. "COS333").
    pub code: String,
    pub title: String,
    pub year: i32,
    pub ref_latitude: Option<f64>,
    pub ref_longitude: Option<f64>,
    pub checkin_radius_m: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::course_enrollment::Entity")]
    Enrollments,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
}

impl Related<super::course_enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        code: &str,
        title: &str,
        year: i32,
        ref_latitude: Option<f64>,
        ref_longitude: Option<f64>,
        checkin_radius_m: Option<f64>,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        ActiveModel {
            code: Set(code.to_owned()),
            title: Set(title.to_owned()),
            year: Set(year),
            ref_latitude: Set(ref_latitude),
            ref_longitude: Set(ref_longitude),
            checkin_radius_m: Set(checkin_radius_m),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
    }
}
