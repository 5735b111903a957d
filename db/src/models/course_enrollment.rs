use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Links a user to a course with a role. One row per user per course.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "course_enrollments")]
pub struct Model {
    /// User ID (foreign key to `users`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,

    /// Course ID (foreign key to `courses`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub course_id: i64,

    /// Role type: Lecturer or Student
    pub role: Role,

    /// Inactive enrollments are excluded from attendance windows.
    pub active: bool,
}

/// Enum representing user roles within a course.
#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "course_role_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "lecturer")]
    Lecturer,

    #[sea_orm(string_value = "student")]
    Student,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }

    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// One active student enrollment, as captured for an attendance window.
#[derive(Debug, Clone, FromQueryResult)]
pub struct EnrollmentRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

impl Model {
    pub async fn enroll(
        db: &DatabaseConnection,
        user_id: i64,
        course_id: i64,
        role: Role,
        active: bool,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            user_id: Set(user_id),
            course_id: Set(course_id),
            role: Set(role),
            active: Set(active),
        }
        .insert(db)
        .await
    }

    /// Active student enrollments for a course with usernames and emails,
    /// ordered by user id.
    pub async fn snapshot_for_course(
        db: &DatabaseConnection,
        course_id: i64,
    ) -> Result<Vec<EnrollmentRow>, DbErr> {
        Entity::find()
            .filter(Column::CourseId.eq(course_id))
            .filter(Column::Role.eq(Role::Student))
            .filter(Column::Active.eq(true))
            .inner_join(super::user::Entity)
            .select_only()
            .column_as(super::user::Column::Id, "user_id")
            .column(super::user::Column::Username)
            .column(super::user::Column::Email)
            .order_by_asc(super::user::Column::Id)
            .into_model::<EnrollmentRow>()
            .all(db)
            .await
    }
}
