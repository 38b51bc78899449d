pub trait Path {
    fn is_absolute(&self) -> bool;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// 依次给出路径的各个组成部分，空的部分被跳过
    fn components(&self) -> impl Iterator<Item = &Self>;

    /// 返回路径的`(父目录, 文件名)`，忽略末尾的`/`。
    ///
    /// 只有一个组成部分的相对路径，其父目录为`.`；
    /// 根目录与空路径没有文件名，返回`None`。
    fn parent_file(&self) -> Option<(&Self, &Self)>;
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn components(&self) -> impl Iterator<Item = &Self> {
        self.split('/').filter(|cmp| !cmp.is_empty())
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let path = self.trim_end_matches('/');
        if path.is_empty() {
            return None;
        }

        Some(match path.rsplit_once('/') {
            Some(("", file)) => ("/", file),
            Some((parent, file)) => (parent, file),
            None => (".", path),
        })
    }
}
