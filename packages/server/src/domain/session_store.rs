//! セッションストアの trait 定義
//!
//! 1 プロセス内で共有されるキー・バリューストア。各操作はキー単位でアトミックであること。
//! 複数インスタンスでの共有が必要になった場合は、この trait を外部ストアで実装する。

use super::Session;

pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Option<Session>;

    fn set(&self, session: Session);

    /// 削除したセッションを返す（存在しなければ `None`）
    fn delete(&self, session_id: &str) -> Option<Session>;

    /// `last_activity_at` を更新し、更新後のセッションを返す
    fn touch(&self, session_id: &str, now_millis: i64) -> Option<Session>;

    /// 条件を満たすセッションを削除し、削除したものを返す
    ///
    /// 判定と削除はキー単位でアトミックに行う（判定後に touch されたものは残る）。
    fn sweep(&self, is_expired: &(dyn Fn(&Session) -> bool + Sync)) -> Vec<Session>;

    fn list(&self) -> Vec<Session>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
