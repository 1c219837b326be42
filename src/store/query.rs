// Backend-neutral filter expressions over the posts collection
use crate::db::models::{PostCategory, PostId, PostStatus, UserId, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Status,
    Visibility,
    Category,
    UserId,
    /// List-valued: matches when the post shares any of the given ids.
    GroupIds,
}

impl Field {
    fn column(&self) -> &'static str {
        match self {
            Field::Status => "p.status",
            Field::Visibility => "p.visibility",
            Field::Category => "p.category",
            Field::UserId => "p.user_id",
            Field::GroupIds => "pg.group_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Field value is one of `values`. An empty list matches nothing.
    In(Field, Vec<String>),
    And(Vec<Filter>),
    /// An empty disjunction matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Filter::In(field, vec![value.into()])
    }

    pub fn status(status: PostStatus) -> Self {
        Self::equals(Field::Status, status.as_db())
    }

    pub fn visibility(visibility: Visibility) -> Self {
        Self::equals(Field::Visibility, visibility.as_db())
    }

    pub fn category(category: PostCategory) -> Self {
        Self::equals(Field::Category, category.as_db())
    }

    pub fn owner(user: &UserId) -> Self {
        Self::equals(Field::UserId, user.as_str())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            this => Filter::And(vec![this, other]),
        }
    }

    /// Appends this filter's SQL to `sql` and its bind values to `params`.
    pub fn to_sql(&self, sql: &mut String, params: &mut Vec<String>) {
        match self {
            Filter::All => sql.push_str("1"),
            Filter::In(_, values) if values.is_empty() => sql.push_str("0"),
            Filter::In(Field::GroupIds, values) => {
                sql.push_str(
                    "EXISTS (SELECT 1 FROM post_groups pg WHERE pg.post_id = p.id AND ",
                );
                push_in_list(Field::GroupIds.column(), values, sql, params);
                sql.push(')');
            }
            Filter::In(field, values) => push_in_list(field.column(), values, sql, params),
            Filter::And(parts) => push_joined(parts, " AND ", "1", sql, params),
            Filter::Or(parts) => push_joined(parts, " OR ", "0", sql, params),
        }
    }
}

fn push_in_list(column: &str, values: &[String], sql: &mut String, params: &mut Vec<String>) {
    sql.push_str(column);
    sql.push_str(" IN (");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        params.push(value.clone());
    }
    sql.push(')');
}

fn push_joined(
    parts: &[Filter],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<String>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        part.to_sql(sql, params);
    }
    sql.push(')');
}

/// One page request against the posts collection.
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub filter: Filter,
    pub limit: u32,
    /// Return only posts ordered strictly after this one.
    pub after: Option<PostId>,
}
