use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::{NotSet, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A submitted order, identified by the email it came in with.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "order")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub email: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attached_file::Entity")]
    AttachedFiles,
}

impl Related<super::attached_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttachedFiles.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// `created_at` is stamped on insert and never written afterwards.
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            self.created_at = Set(Utc::now());
        } else {
            self.created_at = NotSet;
        }
        Ok(self)
    }
}

impl Model {
    /// Every file attached to this order.
    pub async fn attached_files<C>(&self, db: &C) -> Result<Vec<super::attached_file::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        self.find_related(super::attached_file::Entity).all(db).await
    }
}
