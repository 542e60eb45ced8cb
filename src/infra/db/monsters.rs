use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateMonsterParams, MonsterQueryFilter, MonstersRepo, MonstersWriteRepo, RepoError,
    UpdateMonsterParams,
};
use crate::domain::entities::{CategoryRecord, MonsterImage, MonsterRecord, TypeRecord};
use crate::domain::monsters::pair_image;

use super::PostgresRepositories;
use super::util::{map_sqlx_error, stat_from_column};

const MONSTER_SELECT: &str = "SELECT m.id, m.name, m.category_id, c.name AS category_name, \
    m.description, m.length, m.weight, m.hp, m.attack, m.defends, m.speed, m.captured, \
    m.image_name, m.image_url, m.created_at, m.updated_at \
    FROM monsters m \
    INNER JOIN categories c ON c.id = m.category_id";

#[derive(sqlx::FromRow)]
struct MonsterRow {
    id: String,
    name: String,
    category_id: String,
    category_name: String,
    description: String,
    length: f32,
    weight: i32,
    hp: i32,
    attack: i32,
    defends: i32,
    speed: i32,
    captured: bool,
    image_name: Option<String>,
    image_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl MonsterRow {
    fn into_record(self, types: Vec<TypeRecord>) -> Result<MonsterRecord, RepoError> {
        let image =
            pair_image(self.image_name, self.image_url).map_err(RepoError::from_persistence)?;
        Ok(MonsterRecord {
            id: self.id,
            name: self.name,
            category: CategoryRecord {
                id: self.category_id,
                name: self.category_name,
            },
            description: self.description,
            length: self.length,
            weight: stat_from_column("weight", self.weight)?,
            hp: stat_from_column("hp", self.hp)?,
            attack: stat_from_column("attack", self.attack)?,
            defends: stat_from_column("defends", self.defends)?,
            speed: stat_from_column("speed", self.speed)?,
            captured: self.captured,
            image,
            types,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MonsterTypeRow {
    monster_id: String,
    id: String,
    name: String,
}

impl PostgresRepositories {
    fn apply_monster_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &MonsterQueryFilter) {
        if !filter.type_ids.is_empty() {
            qb.push(" INNER JOIN monster_types mt ON mt.monster_id = m.id");
        }

        qb.push(" WHERE 1=1");

        if let Some(name) = filter.name.as_ref() {
            qb.push(" AND m.name ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(name)));
        }

        if let Some(captured) = filter.captured {
            qb.push(" AND m.captured = ");
            qb.push_bind(captured);
        }

        if !filter.type_ids.is_empty() {
            qb.push(" AND mt.type_id = ANY(");
            qb.push_bind(filter.type_ids.clone());
            qb.push(")");
            qb.push(" GROUP BY m.id, c.id");
        }

        match filter.sort {
            Some(sort) => {
                qb.push(" ORDER BY ");
                qb.push(sort.field.column());
                qb.push(" ");
                qb.push(sort.direction.as_sql());
                qb.push(", m.id ASC");
            }
            None => {
                qb.push(" ORDER BY m.created_at ASC, m.id ASC");
            }
        }
    }

    /// Eager-load the types of every row with a single query.
    async fn attach_types(&self, rows: Vec<MonsterRow>) -> Result<Vec<MonsterRecord>, RepoError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let type_rows = sqlx::query_as::<_, MonsterTypeRow>(
            r#"
            SELECT mt.monster_id, t.id, t.name
            FROM monster_types mt
            INNER JOIN types t ON t.id = mt.type_id
            WHERE mt.monster_id = ANY($1)
            ORDER BY t.name, t.id
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut by_monster: HashMap<String, Vec<TypeRecord>> = HashMap::new();
        for row in type_rows {
            by_monster.entry(row.monster_id).or_default().push(TypeRecord {
                id: row.id,
                name: row.name,
            });
        }

        rows.into_iter()
            .map(|row| {
                let types = by_monster.remove(&row.id).unwrap_or_default();
                row.into_record(types)
            })
            .collect()
    }

    async fn load_monster(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError> {
        let sql = format!("{MONSTER_SELECT} WHERE m.id = $1");
        let row = sqlx::query_as::<_, MonsterRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.attach_types(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn reload_monster(&self, id: &str) -> Result<MonsterRecord, RepoError> {
        self.load_monster(id).await?.ok_or(RepoError::NotFound)
    }

    async fn insert_monster_types(
        tx: &mut Transaction<'_, Postgres>,
        monster_id: &str,
        type_ids: &[String],
    ) -> Result<(), RepoError> {
        if type_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO monster_types (monster_id, type_id)
            SELECT DISTINCT $1, type_id
            FROM UNNEST($2::text[]) AS type_id
            "#,
        )
        .bind(monster_id)
        .bind(type_ids.to_vec())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl MonstersRepo for PostgresRepositories {
    async fn list_monsters(
        &self,
        filter: &MonsterQueryFilter,
    ) -> Result<Vec<MonsterRecord>, RepoError> {
        self.bounded(async {
            let mut qb = QueryBuilder::<Postgres>::new(MONSTER_SELECT);
            Self::apply_monster_filter(&mut qb, filter);

            let rows = qb
                .build_query_as::<MonsterRow>()
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

            self.attach_types(rows).await
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonsterRecord>, RepoError> {
        self.bounded(self.load_monster(id)).await
    }
}

#[async_trait]
impl MonstersWriteRepo for PostgresRepositories {
    async fn create_monster(
        &self,
        params: CreateMonsterParams,
    ) -> Result<MonsterRecord, RepoError> {
        self.bounded(async {
            let CreateMonsterParams {
                name,
                category_id,
                description,
                length,
                weight,
                hp,
                attack,
                defends,
                speed,
                type_ids,
            } = params;

            let id = Uuid::new_v4().to_string();
            let mut tx = self.begin().await.map_err(map_sqlx_error)?;

            sqlx::query(
                r#"
                INSERT INTO monsters (
                    id, name, category_id, description, length,
                    weight, hp, attack, defends, speed, captured
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE)
                "#,
            )
            .bind(&id)
            .bind(name)
            .bind(category_id)
            .bind(description)
            .bind(length)
            .bind(i32::from(weight))
            .bind(i32::from(hp))
            .bind(i32::from(attack))
            .bind(i32::from(defends))
            .bind(i32::from(speed))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            Self::insert_monster_types(&mut tx, &id, &type_ids).await?;

            tx.commit().await.map_err(map_sqlx_error)?;

            self.reload_monster(&id).await
        })
        .await
    }

    async fn update_monster(
        &self,
        params: UpdateMonsterParams,
    ) -> Result<MonsterRecord, RepoError> {
        self.bounded(async {
            let mut tx = self.begin().await.map_err(map_sqlx_error)?;

            let result = sqlx::query(
                r#"
                UPDATE monsters
                SET name = $2,
                    category_id = $3,
                    description = $4,
                    length = $5,
                    weight = $6,
                    hp = $7,
                    attack = $8,
                    defends = $9,
                    speed = $10,
                    captured = $11,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(&params.id)
            .bind(&params.name)
            .bind(&params.category_id)
            .bind(&params.description)
            .bind(params.length)
            .bind(i32::from(params.weight))
            .bind(i32::from(params.hp))
            .bind(i32::from(params.attack))
            .bind(i32::from(params.defends))
            .bind(i32::from(params.speed))
            .bind(params.captured)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }

            if let Some(type_ids) = params.type_ids.as_ref().filter(|ids| !ids.is_empty()) {
                sqlx::query("DELETE FROM monster_types WHERE monster_id = $1")
                    .bind(&params.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                Self::insert_monster_types(&mut tx, &params.id, type_ids).await?;
            }

            tx.commit().await.map_err(map_sqlx_error)?;

            self.reload_monster(&params.id).await
        })
        .await
    }

    async fn set_monster_image(
        &self,
        id: &str,
        image: MonsterImage,
    ) -> Result<MonsterRecord, RepoError> {
        self.bounded(async {
            let result = sqlx::query(
                r#"
                UPDATE monsters
                SET image_name = $2, image_url = $3, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(image.name)
            .bind(image.url)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }

            self.reload_monster(id).await
        })
        .await
    }

    async fn set_monster_captured(&self, id: &str, captured: bool) -> Result<(), RepoError> {
        self.bounded(async {
            let result = sqlx::query(
                r#"
                UPDATE monsters
                SET captured = $2, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(captured)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete_monster(&self, id: &str) -> Result<(), RepoError> {
        self.bounded(async {
            let mut tx = self.begin().await.map_err(map_sqlx_error)?;

            sqlx::query("DELETE FROM monster_types WHERE monster_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            let result = sqlx::query("DELETE FROM monsters WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }

            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(())
        })
        .await
    }
}

/// Escape `LIKE` metacharacters so the name filter is a plain substring match.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
