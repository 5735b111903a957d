use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;

/// A finalized attendance outcome for one student in one course window.
///
/// Rows are written exactly once per resolved entry: either a "present" row
/// at check-in or an "absent" row when the window is reconciled.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub course_id: i64,
    pub student_id: i64,
    pub present: bool,
    /// Check-in method for present rows; absent rows have none.
    pub method: Option<String>,
    /// Who caused the write: the student for self check-ins, the session
    /// owner for sweeper reconciliation.
    pub changed_by: i64,
    pub change_reason: String,
    pub taken_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        db: &DatabaseConnection,
        course_id: i64,
        student_id: i64,
        present: bool,
        method: Option<&str>,
        changed_by: i64,
        change_reason: &str,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            course_id: Set(course_id),
            student_id: Set(student_id),
            present: Set(present),
            method: Set(method.map(|s| s.to_owned())),
            changed_by: Set(changed_by),
            change_reason: Set(change_reason.to_owned()),
            taken_at: Set(taken_at),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    /// All rows for a course, oldest first, then by student id.
    pub async fn for_course(
        db: &DatabaseConnection,
        course_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        Entity::find()
            .filter(Column::CourseId.eq(course_id))
            .order_by_asc(Column::TakenAt)
            .order_by_asc(Column::StudentId)
            .all(db)
            .await
    }
}
